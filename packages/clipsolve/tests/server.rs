//! Companion server routes over real HTTP

use clipsolve::server::{HistoryBody, ResponseBody, TestAck};
use clipsolve::{CompanionServer, SharedResponse};

async fn start(state: SharedResponse) -> (CompanionServer, String) {
    let server = CompanionServer::start("127.0.0.1", 0, state).await.unwrap();
    let base = format!("http://{}", server.local_addr());
    (server, base)
}

#[tokio::test]
async fn test_response_defaults_then_updates() {
    let state = SharedResponse::new();
    let (server, base) = start(state.clone()).await;

    let body: ResponseBody = reqwest::get(format!("{base}/response"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.response, "No response yet.");

    state.update("Sort, then binary search.").await;
    let body: ResponseBody = reqwest::get(format!("{base}/response"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.response, "Sort, then binary search.");

    server.stop().await;
}

#[tokio::test]
async fn test_history_lists_finalized_responses() {
    let state = SharedResponse::new();
    let (server, base) = start(state.clone()).await;

    state.update("first").await;
    state.finalize("gpt-4o-mini").await;
    state.update("second").await;
    state.finalize("gpt-4o").await;

    let body: HistoryBody = reqwest::get(format!("{base}/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let responses: Vec<&str> = body.history.iter().map(|h| h.response.as_str()).collect();
    assert_eq!(responses, vec!["first", "second"]);
    assert_eq!(body.history[1].model, "gpt-4o");

    server.stop().await;
}

#[tokio::test]
async fn test_connection_endpoint_echoes_message() {
    let (server, base) = start(SharedResponse::new()).await;

    let ack: TestAck = reqwest::Client::new()
        .post(format!("{base}/test_connection"))
        .json(&serde_json::json!({ "message": "hello from test" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack.status, "ok");
    assert_eq!(ack.received, "hello from test");

    server.stop().await;
}

#[tokio::test]
async fn test_index_page_polls_response() {
    let (server, base) = start(SharedResponse::new()).await;

    let page = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
    assert!(page.contains("/response"));

    server.stop().await;
}

#[tokio::test]
async fn test_stop_releases_port() {
    let (server, base) = start(SharedResponse::new()).await;
    server.stop().await;

    let result = reqwest::get(format!("{base}/response")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_ping_against_running_server() {
    let (server, _base) = start(SharedResponse::new()).await;
    let port = i64::from(server.local_addr().port());

    let ack = clipsolve::send_test_message("127.0.0.1", port).await.unwrap();
    assert_eq!(ack.received, "Test Connection from Desktop App");

    assert!(matches!(
        clipsolve::send_test_message("127.0.0.1", 0).await,
        Err(clipsolve::NotifyError::InvalidPort(0))
    ));

    server.stop().await;
}

#[tokio::test]
async fn test_ping_timeout_is_reported_distinctly() {
    use std::time::Duration;

    use axum::routing::post;
    use axum::Router;
    use clipsolve::{send_test_message_with_timeout, NotifyError};

    // Accepts the connection but answers long after the client gives up.
    let app = Router::new().route(
        "/test_connection",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "late"
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = i64::from(listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let started = std::time::Instant::now();
    let result = send_test_message_with_timeout("127.0.0.1", port, Duration::from_millis(200)).await;
    assert!(matches!(result, Err(NotifyError::Timeout)), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(3));

    // Nothing listening is a connection failure, not a timeout.
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = i64::from(closed.local_addr().unwrap().port());
    drop(closed);
    let result = send_test_message_with_timeout("127.0.0.1", closed_port, Duration::from_millis(200)).await;
    assert!(matches!(result, Err(NotifyError::Connection(_))), "{result:?}");
}
