//! Shared utilities for integration testing.
//!
//! Every server binds `127.0.0.1:0`, so tests can run in parallel.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::server::{Request as WsRequest, Response as WsResponse},
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

use retarget_proxy::config::{ProxyConfig, ProxyMode};
use retarget_proxy::http::HttpServer;
use retarget_proxy::lifecycle::Shutdown;

/// Text frame that makes the WebSocket backend close with 1001.
pub const CLOSE_ME: &str = "close-me";

/// A running proxy plus the handles a test needs to drive it.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config for tests: plain-text upstreams and no env proxies.
pub fn test_config(mode: ProxyMode) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.proxy.mode = mode;
    config.proxy.upstream_tls = false;
    config.proxy.use_env_proxy = false;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    TestProxy {
        addr,
        shutdown,
        config_updates,
    }
}

/// Client that talks to the proxy directly and never follows its redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// An address nothing is listening on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// HTTP backend that describes each request it receives as JSON.
///
/// - `/redirect` answers 302 to `/landed`
/// - `/teapot` answers 418
/// - anything else echoes method, path, query, headers and body
pub async fn start_echo_backend() -> SocketAddr {
    let router = Router::new()
        .route(
            "/redirect",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/landed")]) }),
        )
        .route(
            "/teapot",
            any(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .fallback(echo);
    serve(router).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let seen: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    (
        [
            ("x-upstream", "echo"),
            ("access-control-allow-origin", "*"),
        ],
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "headers": seen,
            "body": String::from_utf8_lossy(&body),
        })),
    )
}

/// WebSocket backend that echoes text and binary frames.
///
/// It selects the last subprotocol offered, so a proxy that guesses the
/// first one is caught. Sending [`CLOSE_ME`] makes it close with 1001. The
/// receiver gets one message per finished connection.
pub async fn start_ws_echo_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, pick_last_protocol).await
                else {
                    return;
                };

                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && msg.to_text().map(|t| t == CLOSE_ME).unwrap_or(false) {
                        let frame = CloseFrame {
                            code: CloseCode::Away,
                            reason: "bye".into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                        while let Some(Ok(_)) = ws.next().await {}
                        break;
                    } else if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    (addr, closed_rx)
}

fn pick_last_protocol(
    request: &WsRequest,
    mut response: WsResponse,
) -> Result<WsResponse, tokio_tungstenite::tungstenite::handshake::server::ErrorResponse> {
    let last = request
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
        .map(str::to_string);
    if let Some(protocol) = last {
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, protocol.parse().unwrap());
    }
    Ok(response)
}

/// Next frame from `ws`, skipping control frames, or `None` once closed.
pub async fn next_frame<S>(ws: &mut S) -> Option<Message>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(Some(Ok(msg))) => return Some(msg),
            Ok(Some(Err(_))) | Ok(None) => return None,
            Err(_) => panic!("no frame within 5s"),
        }
    }
}

/// Point a prefixed-mode proxy at `target` through the home page form.
pub async fn set_target_url(proxy: &TestProxy, target: &str) {
    let res = client()
        .get(proxy.url("/"))
        .query(&[("setUrl", target)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200, "setUrl rejected for {target}");
}
