use axum::{extract::Json, http::StatusCode, routing::post, Router};
use pm_client::{HttpTransport, RpcClient, RpcClientConfig, RpcError, Transport, TransportError};
use pm_core::methods::ListPlatforms;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn client_for(addr: SocketAddr, timeout: Duration) -> RpcClient {
    let config = RpcClientConfig::new(format!("http://{addr}")).with_timeout(timeout);
    RpcClient::new(config, Arc::new(HttpTransport::new())).expect("client")
}

async fn list_platforms(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["jsonrpc"], json!("2.0"));
    assert_eq!(body["method"], json!("list_platforms"));
    Json(json!({
        "jsonrpc": "2.0",
        "id": body["id"].clone(),
        "result": [{"uuid": "p-1", "name": "building-1"}]
    }))
}

#[tokio::test]
async fn posts_json_and_decodes_result() {
    let addr = spawn_stub(Router::new().route("/jsonrpc", post(list_platforms))).await;
    let client = client_for(addr, Duration::from_secs(5));

    let platforms = client
        .invoke(&ListPlatforms, Some("tok-1"))
        .await
        .expect("list platforms");

    assert_eq!(platforms.len(), 1);
    assert_eq!(platforms[0].uuid, "p-1");
    assert_eq!(platforms[0].name, "building-1");
}

#[tokio::test]
async fn non_success_status_is_classified() {
    let app = Router::new().route(
        "/jsonrpc",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let addr = spawn_stub(app).await;
    let client = client_for(addr, Duration::from_secs(5));

    let err = client
        .call("list_platforms", None, None)
        .await
        .expect_err("status error");

    assert_eq!(
        err,
        RpcError::Transport(TransportError::Status {
            status: 503,
            body: "maintenance".to_string()
        })
    );
}

#[tokio::test]
async fn slow_server_times_out() {
    let app = Router::new().route(
        "/jsonrpc",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"jsonrpc": "2.0", "id": null, "result": true}))
        }),
    );
    let addr = spawn_stub(app).await;
    let client = client_for(addr, Duration::from_millis(100));

    let err = client
        .call("list_platforms", None, None)
        .await
        .expect_err("timeout");

    assert!(matches!(
        err,
        RpcError::Transport(TransportError::Timeout { .. })
    ));
}

#[tokio::test]
async fn non_json_body_is_a_decode_failure() {
    let app = Router::new().route("/jsonrpc", post(|| async { "<html>oops</html>" }));
    let addr = spawn_stub(app).await;
    let client = client_for(addr, Duration::from_secs(5));

    let err = client
        .call("list_platforms", None, None)
        .await
        .expect_err("decode error");

    assert!(matches!(
        err,
        RpcError::Transport(TransportError::Decode { .. })
    ));
}

#[tokio::test]
async fn refused_connection_is_a_request_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport = HttpTransport::new();
    let result = transport
        .send(pm_client::TransportRequest::post_json(
            format!("http://{addr}/jsonrpc"),
            b"{}".to_vec(),
            Duration::from_secs(2),
        ))
        .await;

    assert!(matches!(result, Err(TransportError::Request { .. })));
}
