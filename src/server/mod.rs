//! Loopback HTTP surface: `/status` for overlays, `/callback` for the OAuth redirect.

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::tracker::status::{StatusHandle, StatusSnapshot};

#[derive(Clone)]
struct HttpState {
    status: StatusHandle,
    codes: mpsc::Sender<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

pub fn router(status: StatusHandle, codes: mpsc::Sender<String>) -> Router {
    Router::new()
        .route("/status", get(http_status))
        .route("/callback", get(http_callback))
        .with_state(HttpState { status, codes })
}

/// Loopback address the redirect URI points at. `None` for non-local redirects.
pub fn listen_addr(redirect_uri: &str) -> Option<SocketAddr> {
    let url = reqwest::Url::parse(redirect_uri).ok()?;
    let port = url.port_or_known_default()?;
    match url.host_str()? {
        "127.0.0.1" | "localhost" => Some(SocketAddr::from(([127, 0, 0, 1], port))),
        _ => None,
    }
}

/// Bind and serve in a background task.
pub async fn spawn(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("status server listening on http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("status server exited: {e:#}");
        }
    });
    Ok(())
}

async fn http_status(State(state): State<HttpState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot())
}

async fn http_callback(
    State(state): State<HttpState>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        debug!("authorization denied: {error}");
        return (StatusCode::BAD_REQUEST, format!("Authorization failed: {error}"));
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing code parameter.".to_string());
    };
    if state.codes.send(code).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Tracker is not running.".to_string(),
        );
    }
    (
        StatusCode::OK,
        "Authorization received. You can close this tab.".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::StatusPublisher;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_status_serves_latest_snapshot() {
        let publisher = StatusPublisher::new();
        let (tx, _rx) = mpsc::channel(1);
        let app = router(publisher.handle(), tx);

        publisher.update(|s| {
            s.track = "Song".into();
            s.current_lyric = "hello".into();
            s.is_playing = true;
        });

        let (status, body) = get_body(app, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["track"], "Song");
        assert_eq!(v["current_lyric"], "hello");
        assert_eq!(v["is_playing"], true);
        assert_eq!(v["auth_status"], "WAITING");
    }

    #[tokio::test]
    async fn test_callback_forwards_code() {
        let publisher = StatusPublisher::new();
        let (tx, mut rx) = mpsc::channel(1);
        let app = router(publisher.handle(), tx);

        let (status, _) = get_body(app, "/callback?code=AQB-xyz&state=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rx.recv().await.as_deref(), Some("AQB-xyz"));
    }

    #[tokio::test]
    async fn test_callback_without_code() {
        let publisher = StatusPublisher::new();
        let (tx, mut rx) = mpsc::channel(1);

        let (status, body) =
            get_body(router(publisher.handle(), tx.clone()), "/callback?error=access_denied").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("access_denied"));

        let (status, _) = get_body(router(publisher.handle(), tx), "/callback").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_callback_after_tracker_stopped() {
        let publisher = StatusPublisher::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let (status, _) = get_body(router(publisher.handle(), tx), "/callback?code=abc").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_listen_addr_from_redirect() {
        assert_eq!(
            listen_addr("http://127.0.0.1:8888/callback"),
            Some(SocketAddr::from(([127, 0, 0, 1], 8888)))
        );
        assert_eq!(
            listen_addr("http://localhost/callback"),
            Some(SocketAddr::from(([127, 0, 0, 1], 80)))
        );
        assert_eq!(listen_addr("https://example.com/callback"), None);
        assert_eq!(listen_addr("not a url"), None);
    }
}
