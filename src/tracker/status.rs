use serde::Serialize;
use tokio::sync::watch;

pub const WAITING_TEXT: &str = "Waiting for playback...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    #[default]
    Waiting,
    Missing,
    Ok,
    Timeout,
    Expired,
}

/// Everything an outside reader sees of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub is_playing: bool,
    pub track: String,
    pub artist: String,
    pub album: String,
    pub current_lyric: String,
    pub progress_ms: u64,
    pub auth_status: AuthStatus,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            track: String::new(),
            artist: String::new(),
            album: String::new(),
            current_lyric: WAITING_TEXT.to_string(),
            progress_ms: 0,
            auth_status: AuthStatus::default(),
        }
    }
}

/// Write side, owned by the tracker.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<StatusSnapshot>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    /// Apply `f` to the snapshot. Readers only wake when something actually changed.
    pub fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            f(snapshot);
            *snapshot != before
        });
    }

    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side. Cheap to clone; every read is a whole snapshot.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next change and return it. `None` once the tracker is gone.
    pub async fn changed(&mut self) -> Option<StatusSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let snap = StatusSnapshot::default();
        assert_eq!(snap.current_lyric, "Waiting for playback...");
        assert_eq!(snap.auth_status, AuthStatus::Waiting);
        assert!(!snap.is_playing);
    }

    #[test]
    fn test_serialized_shape() {
        let snap = StatusSnapshot {
            auth_status: AuthStatus::Expired,
            ..StatusSnapshot::default()
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["auth_status"], "EXPIRED");
        assert_eq!(v["current_lyric"], "Waiting for playback...");
        assert_eq!(v["progress_ms"], 0);
    }

    #[tokio::test]
    async fn test_readers_see_whole_updates() {
        let publisher = StatusPublisher::new();
        let mut handle = publisher.handle();
        let other = handle.clone();

        publisher.update(|s| {
            s.track = "Song".into();
            s.artist = "Artist".into();
            s.is_playing = true;
        });

        let seen = handle.changed().await.unwrap();
        assert_eq!((seen.track.as_str(), seen.artist.as_str()), ("Song", "Artist"));
        assert_eq!(other.snapshot(), seen);
        assert_eq!(publisher.handle().snapshot(), seen);
    }

    #[tokio::test]
    async fn test_no_op_update_does_not_notify() {
        let publisher = StatusPublisher::new();
        let mut handle = publisher.handle();

        publisher.update(|s| s.is_playing = false);
        assert!(!handle.rx.has_changed().unwrap());

        drop(publisher);
        assert!(handle.changed().await.is_none());
    }
}
