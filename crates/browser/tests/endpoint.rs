//! Launcher tests against a mock debug HTTP endpoint.

use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use webpilot_browser::launch::{connect, query_targets, select_page_target, wait_for_endpoint};
use webpilot_browser::RetryPolicy;
use webpilot_core::Error;

async fn spawn_http(router: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

fn debug_endpoint(targets: Value) -> Router {
    Router::new()
        .route(
            "/json/version",
            get(|| async {
                Json(json!({
                    "Browser": "Chrome/126.0.0.0",
                    "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/browser/b1"
                }))
            }),
        )
        .route("/json", get(move || async move { Json(targets) }))
}

/// A port nothing is listening on.
async fn dead_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn page_targets() -> Value {
    json!([
        {
            "id": "dev1",
            "type": "devtools",
            "title": "DevTools",
            "url": "devtools://devtools/bundled/inspector.html",
            "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/page/dev1"
        },
        {
            "id": "p1",
            "type": "page",
            "title": "First page",
            "url": "about:blank",
            "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/page/p1"
        },
        {
            "id": "p2",
            "type": "page",
            "title": "Second page",
            "url": "https://example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/page/p2"
        }
    ])
}

#[tokio::test]
async fn test_readiness_probe_sees_the_endpoint() {
    let port = spawn_http(debug_endpoint(page_targets())).await;
    let policy = RetryPolicy::new(Duration::from_millis(50), Duration::from_secs(2));
    let version = wait_for_endpoint(port, policy).await.unwrap();
    assert_eq!(version["Browser"], json!("Chrome/126.0.0.0"));
}

#[tokio::test]
async fn test_readiness_ceiling_is_a_distinct_error() {
    let port = dead_port().await;
    let policy = RetryPolicy::new(Duration::from_millis(50), Duration::from_millis(300));
    let err = wait_for_endpoint(port, policy).await.unwrap_err();
    match err {
        Error::EndpointNotReady(msg) => assert!(msg.contains("/json/version")),
        other => panic!("expected EndpointNotReady, got {other:?}"),
    }
}

#[tokio::test]
async fn test_target_query_selects_first_page() {
    let port = spawn_http(debug_endpoint(page_targets())).await;
    let targets = query_targets(port).await.unwrap();
    assert_eq!(targets.len(), 3);
    let ws_url = select_page_target(&targets).unwrap();
    assert_eq!(ws_url, "ws://127.0.0.1:1/devtools/page/p1");
}

#[tokio::test]
async fn test_connect_attaches_to_a_running_browser() {
    let port = spawn_http(debug_endpoint(page_targets())).await;
    let attached = connect(port).await.unwrap();
    assert_eq!(attached.debug_port, port);
    assert_eq!(attached.ws_url, "ws://127.0.0.1:1/devtools/page/p1");
}

#[tokio::test]
async fn test_connect_without_page_targets_is_explicit() {
    let only_workers = json!([
        {
            "id": "w1",
            "type": "service_worker",
            "title": "sw",
            "url": "https://example.com/sw.js",
            "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/page/w1"
        }
    ]);
    let port = spawn_http(debug_endpoint(only_workers)).await;
    let err = connect(port).await.unwrap_err();
    assert!(matches!(err, Error::NoPageTarget(_)));
}

#[tokio::test]
async fn test_connect_refused_port_reads_as_not_ready() {
    let port = dead_port().await;
    let err = connect(port).await.unwrap_err();
    match err {
        Error::EndpointNotReady(msg) => assert!(msg.contains(&port.to_string())),
        other => panic!("expected EndpointNotReady, got {other:?}"),
    }
}
