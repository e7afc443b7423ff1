use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use faas_telemetry::WrappedResponse;
use faas_worker_server::{create_app, Worker, WorkerConfig};
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A sandbox that echoes the body back, tagging the path it was called on.
async fn start_sandbox() -> SocketAddr {
    let app = Router::new()
        .route(
            "/run/echo",
            post(|headers: HeaderMap, body: Bytes| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                (
                    StatusCode::OK,
                    [("content-type", content_type), ("x-sandbox", "echo".to_string())],
                    body,
                )
            }),
        )
        .route(
            "/run/teapot",
            post(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        );
    serve(app).await
}

async fn start_worker(config: WorkerConfig) -> SocketAddr {
    let worker = Worker::build(&config).unwrap();
    serve(create_app(worker.state, &config.invoke_prefix())).await
}

fn config_for(sandbox: SocketAddr) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    for name in ["echo", "teapot"] {
        config
            .sandboxes
            .insert(name.to_string(), format!("http://{sandbox}"));
    }
    config
}

#[tokio::test]
async fn test_invocation_round_trips_through_sandbox() {
    let sandbox = start_sandbox().await;
    let worker = start_worker(config_for(sandbox)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{worker}/run/echo"))
        .header("content-type", "application/json")
        .body(r#"{"hello":"world"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let envelope = WrappedResponse::decode(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(envelope.response_code, 200);
    assert_eq!(envelope.response_body, br#"{"hello":"world"}"#);
    assert_eq!(envelope.response_header["X-Sandbox"], vec!["echo".to_string()]);
    assert_eq!(
        envelope.response_header["Content-Type"],
        vec!["application/json".to_string()]
    );
}

#[tokio::test]
async fn test_sandbox_status_reaches_client() {
    let sandbox = start_sandbox().await;
    let worker = start_worker(config_for(sandbox)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{worker}/run/teapot"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::IM_A_TEAPOT);
    let envelope = WrappedResponse::decode(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(envelope.response_code, 418);
    assert_eq!(envelope.response_body, b"short and stout");
}

#[tokio::test]
async fn test_history_and_status_endpoints() {
    let sandbox = start_sandbox().await;
    let worker = start_worker(config_for(sandbox)).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .post(format!("http://{worker}/run/echo"))
            .body("ping")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let status = client
        .get(format!("http://{worker}/status"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(status, "ready\n");

    let history: serde_json::Value = client
        .get(format!("http://{worker}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = history["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["OPEN", "CLOSE", "OPEN", "CLOSE"]);
}
