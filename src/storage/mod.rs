use anyhow::Context;
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::lyrics::{LyricDocument, TrackIdentity};

static ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[:<>"|?*\x00-\x08\x0b\x0c\x0e-\x1f]"#).expect("illegal char pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern"));

/// Cache slot name for a raw (unnormalized) artist and title.
pub fn cache_key(artist: &str, title: &str) -> String {
    let joined = format!("{artist} - {title}");
    let s = joined.trim().replace(['/', '\\'], "-");
    let s = ILLEGAL.replace_all(&s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    truncate_on_char_boundary(s.trim(), MAX_KEY_BYTES).trim_end().to_string()
}

/// Keeps `<key>.json` under the usual 255-byte file name limit.
const MAX_KEY_BYTES: usize = 200;

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Lyric documents on disk, one JSON file per track.
///
/// Reads are synchronous. A write goes to a temp file in the same directory and
/// is renamed into place, so readers see either the old file or the new one.
/// Entries are never evicted from disk; decoded documents are also kept in a
/// small in-memory LRU.
#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    memo: Arc<Mutex<LruCache<String, LyricDocument>>>,
}

impl CacheStore {
    pub fn open(dir: &Path, memo_capacity: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
        let cap = NonZeroUsize::new(memo_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            dir: dir.to_path_buf(),
            memo: Arc::new(Mutex::new(LruCache::new(cap))),
        })
    }

    pub fn key_for(identity: &TrackIdentity) -> String {
        cache_key(&identity.artist, &identity.title)
    }

    pub fn path_for(&self, identity: &TrackIdentity) -> PathBuf {
        self.file_for(&Self::key_for(identity))
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached document for `identity`. Missing and unreadable files are both misses.
    pub fn read(&self, identity: &TrackIdentity) -> Option<LyricDocument> {
        let key = Self::key_for(identity);
        if let Some(doc) = self.memo.lock().get(&key) {
            return Some(doc.clone());
        }

        let path = self.file_for(&key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("read {}: {e}", path.display());
                return None;
            }
        };
        match LyricDocument::from_json(&raw) {
            Ok(doc) => {
                self.memo.lock().put(key, doc.clone());
                Some(doc)
            }
            Err(e) => {
                warn!("corrupt lyric cache {}: {e}", path.display());
                None
            }
        }
    }

    /// Persist `doc` for `identity`. The last write for a key wins.
    pub fn write(&self, identity: &TrackIdentity, doc: &LyricDocument) -> anyhow::Result<()> {
        let key = Self::key_for(identity);
        let path = self.file_for(&key);
        let raw = doc.to_json().context("serialize lyrics")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("create temp file in {}", self.dir.display()))?;
        tmp.write_all(raw.as_bytes()).context("write lyrics")?;
        tmp.flush().context("flush lyrics")?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("persist {}", path.display()))?;

        debug!("cached {} lines at {}", doc.len(), path.display());
        self.memo.lock().put(key, doc.clone());
        Ok(())
    }
}
