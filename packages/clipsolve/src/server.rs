//! Companion server: lets a phone or second screen poll the latest response.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use axum::{
    extract::{Json, State},
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::state::{HistoryEntry, SharedResponse};
use crate::validation::{validate_port, ValidationError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    InvalidPort(#[from] ValidationError),
    #[error("failed to bind companion server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>clipsolve</title>
<style>
body { background: #1e1e1e; color: #d4d4d4; font-family: sans-serif; margin: 1em; }
pre { white-space: pre-wrap; word-wrap: break-word; font-size: 15px; }
#status { color: #888; font-size: 12px; }
</style>
</head>
<body>
<div id="status">waiting...</div>
<pre id="response"></pre>
<script>
async function poll() {
  try {
    const res = await fetch('/response');
    const data = await res.json();
    document.getElementById('response').textContent = data.response;
    document.getElementById('status').textContent = 'updated ' + new Date().toLocaleTimeString();
  } catch (e) {
    document.getElementById('status').textContent = 'connection lost';
  }
}
setInterval(poll, 1000);
poll();
</script>
</body>
</html>
"#;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseBody {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryBody {
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestMessage {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestAck {
    pub status: String,
    pub received: String,
}

/// Routes served to companion devices.
pub fn create_router(state: SharedResponse) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/response", get(get_response))
        .route("/history", get(get_history))
        .route("/test_connection", post(test_connection))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn get_response(State(state): State<SharedResponse>) -> Json<ResponseBody> {
    Json(ResponseBody {
        response: state.latest().await,
    })
}

async fn get_history(State(state): State<SharedResponse>) -> Json<HistoryBody> {
    Json(HistoryBody {
        history: state.history().await,
    })
}

async fn test_connection(Json(body): Json<TestMessage>) -> Json<TestAck> {
    info!(message = %body.message, "companion test message received");
    Json(TestAck {
        status: "ok".to_string(),
        received: body.message,
    })
}

/// Running companion server. Dropping it without [`CompanionServer::stop`] leaves the
/// server running until the runtime shuts down.
pub struct CompanionServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CompanionServer {
    /// Validates `port`, binds `host:port` and starts serving in a background task.
    pub async fn start(host: &str, port: i64, state: SharedResponse) -> Result<Self, ServerError> {
        let port = validate_port(port)?;
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;

        let (tx, rx) = oneshot::channel::<()>();
        let app = create_router(state);
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "companion server stopped with error");
            }
        });

        info!(%addr, "companion server listening");
        Ok(Self {
            addr,
            shutdown: Some(tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL a device on the same network should open.
    pub fn url(&self) -> String {
        let ip = if self.addr.ip().is_unspecified() {
            local_ip()
        } else {
            self.addr.ip()
        };
        format!("http://{}/", SocketAddr::new(ip, self.addr.port()))
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "companion server task ended abnormally");
        }
        info!(addr = %self.addr, "companion server stopped");
    }
}

/// LAN address of the interface holding the default route, or loopback if none.
///
/// No packets are sent: connecting a UDP socket only selects a route.
pub fn local_ip() -> IpAddr {
    let route_source = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(("8.8.8.8", 80))?;
        Ok(socket.local_addr()?.ip())
    };
    match route_source() {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "could not determine local IP; using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_rejects_invalid_port() {
        let state = SharedResponse::new();
        let err = CompanionServer::start("127.0.0.1", 70000, state.clone())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::InvalidPort(ValidationError::InvalidPort(70000))));

        let err = CompanionServer::start("127.0.0.1", -5, state).await.err().unwrap();
        assert!(matches!(err, ServerError::InvalidPort(_)));
    }

    #[tokio::test]
    async fn test_url_uses_bound_port() {
        let server = CompanionServer::start("127.0.0.1", 0, SharedResponse::new())
            .await
            .unwrap();
        let port = server.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(server.url(), format!("http://127.0.0.1:{port}/"));
        server.stop().await;
    }

    #[test]
    fn test_local_ip_never_fails() {
        let ip = local_ip();
        assert!(!ip.is_unspecified());
    }
}
