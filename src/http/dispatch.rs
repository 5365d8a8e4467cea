//! Request dispatch.
//!
//! Every inbound request lands in [`dispatch`], which classifies it once and
//! hands it to the configuration handlers, the WebSocket relay or the HTTP
//! relay. Classification is a pure function so routing can be tested without
//! a server.

use axum::{
    body::Body,
    extract::{FromRequest, FromRequestParts, State, WebSocketUpgrade},
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use http_body_util::LengthLimitError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{ProxyMode, ProxySettings};
use crate::error::ProxyError;
use crate::http::pages::{self, HomeStatus};
use crate::http::relay::relay;
use crate::http::server::AppState;
use crate::http::transform::{
    destination_url, outbound_headers, request_overrides, response_overrides, transform, Channel,
};
use crate::http::websocket::{connect_upstream, relay_session, requested_protocols};
use crate::observability::metrics;
use crate::target::{ProxyTarget, TargetRecord, TargetUpdate};

/// Configuration endpoint, identical in both modes.
pub const CONFIG_PATH: &str = "/config";

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    ConfigRead,
    ConfigUpdate,
    WebSocket,
    Http,
    RedirectHome,
    MethodNotAllowed,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::ConfigRead => "config_read",
            Route::ConfigUpdate => "config_update",
            Route::WebSocket => "websocket",
            Route::Http => "http",
            Route::RedirectHome => "redirect_home",
            Route::MethodNotAllowed => "method_not_allowed",
        }
    }
}

/// True when any `Upgrade` token is `websocket`, ignoring case.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}

/// Decide where a request goes. First match wins.
pub fn classify(settings: &ProxySettings, method: &Method, path: &str, headers: &HeaderMap) -> Route {
    if path == settings.home_path {
        return Route::Home;
    }

    if path == CONFIG_PATH {
        return match (settings.mode, method) {
            (_, &Method::GET) | (_, &Method::HEAD) => Route::ConfigRead,
            (ProxyMode::Direct, &Method::POST) => Route::ConfigUpdate,
            _ => Route::MethodNotAllowed,
        };
    }

    let proxied = match settings.mode {
        ProxyMode::Prefixed => path.starts_with(settings.route_prefix.as_str()),
        ProxyMode::Direct => true,
    };

    match (proxied, is_websocket_upgrade(headers)) {
        (true, true) => Route::WebSocket,
        (true, false) => Route::Http,
        (false, _) => Route::RedirectHome,
    }
}

/// JSON view of the current target, served on `GET /config`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub mode: ProxyMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRecord>,
}

/// Entry point for every inbound request.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = classify(&state.settings, &method, request.uri().path(), request.headers());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        route = route.as_str(),
        "Dispatching request"
    );

    let result = match route {
        Route::Home => home(&state, request.uri()).await,
        Route::ConfigRead => config_read(&state).await,
        Route::ConfigUpdate => config_update(&state, request).await,
        Route::WebSocket => proxy_websocket(&state, request).await,
        Route::Http => proxy_http(&state, request).await,
        Route::RedirectHome => Ok(redirect_home(&state.settings.home_path)),
        Route::MethodNotAllowed => Ok(method_not_allowed(state.settings.mode)),
    };

    let response = result.unwrap_or_else(|e| {
        tracing::debug!(request_id = %request_id, error = %e, "Request failed");
        e.into_response()
    });
    metrics::record_request(method.as_str(), response.status().as_u16(), route.as_str(), start);
    response
}

async fn home(state: &AppState, uri: &Uri) -> Result<Response, ProxyError> {
    if state.settings.mode == ProxyMode::Direct {
        let record = state.resolver.record().unwrap_or_default();
        return Ok(Html(pages::direct_home(&record)).into_response());
    }

    let home = &state.settings.home_path;
    let prefix = &state.settings.route_prefix;
    if let Some(new_url) = set_url_param(uri) {
        return match state.resolver.set_url(&new_url).await {
            Ok(()) => Ok(Html(pages::prefixed_home(HomeStatus::Saved(&new_url), home, prefix))
                .into_response()),
            Err(ProxyError::InvalidTargetInput(reason)) => {
                tracing::debug!(input = %new_url, reason = %reason, "Rejected target URL");
                let page = pages::prefixed_home(
                    HomeStatus::Error("Invalid URL, please check the format."),
                    home,
                    prefix,
                );
                Ok((StatusCode::BAD_REQUEST, Html(page)).into_response())
            }
            Err(e) => Err(e),
        };
    }

    let page = match state.resolver.resolve().await? {
        Some(ProxyTarget::BaseUrl(url)) => {
            pages::prefixed_home(HomeStatus::Current(&url), home, prefix)
        }
        _ => pages::prefixed_home(HomeStatus::Unset, home, prefix),
    };
    Ok(Html(page).into_response())
}

/// Non-empty `setUrl` query value, percent-decoded.
fn set_url_param(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "setUrl")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

async fn config_read(state: &AppState) -> Result<Response, ProxyError> {
    let view = match state.settings.mode {
        ProxyMode::Prefixed => ConfigView {
            mode: ProxyMode::Prefixed,
            target_url: match state.resolver.resolve().await? {
                Some(ProxyTarget::BaseUrl(url)) => Some(url),
                _ => None,
            },
            target: None,
        },
        ProxyMode::Direct => ConfigView {
            mode: ProxyMode::Direct,
            target_url: None,
            target: state.resolver.record().map(Arc::unwrap_or_clone),
        },
    };
    Ok(Json(view).into_response())
}

async fn config_update(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    let back_to = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("/")
        .to_string();

    let update = match Form::<TargetUpdate>::from_request(request, &()).await {
        Ok(Form(update)) => update,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    state.resolver.update(&update)?;
    Ok(Redirect::to(&back_to).into_response())
}

async fn proxy_http(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    let target = state
        .resolver
        .resolve()
        .await?
        .ok_or(ProxyError::NoTargetConfigured)?;

    let (parts, body) = request.into_parts();
    let limit = state.settings.max_request_body_bytes;
    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| body_error(e, limit))?;

    let outbound = transform(&parts, body, &target, &state.rules())?;
    relay(&state.client, outbound, &response_overrides(&target)).await
}

fn body_error(e: axum::Error, limit: usize) -> ProxyError {
    let inner = e.into_inner();
    if inner.is::<LengthLimitError>() {
        ProxyError::BodyTooLarge { limit }
    } else {
        ProxyError::InboundBody(inner.to_string())
    }
}

/// Resolve the target and connect upstream before upgrading. Resolution
/// failures reach the client as plain HTTP statuses; the upstream's chosen
/// subprotocol is echoed in the client handshake.
async fn proxy_websocket(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    let target = state
        .resolver
        .resolve()
        .await?
        .ok_or(ProxyError::NoTargetConfigured)?;

    let (mut parts, _body) = request.into_parts();
    let url = destination_url(&target, &parts.uri, &state.rules(), Channel::WebSocket)?;
    let headers = outbound_headers(&parts.headers, &request_overrides(&target), Channel::WebSocket);
    let offered = requested_protocols(&parts.headers);

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let session_id = Uuid::new_v4();
    let (upstream, upgrade) = match connect_upstream(&url, &headers).await {
        Ok(handshake) => {
            let upgrade = match handshake.protocol {
                Some(protocol) => upgrade.protocols([protocol]),
                None => upgrade,
            };
            (Ok(handshake.socket), upgrade)
        }
        // The client still gets its upgrade, then an error close frame.
        Err(e) => (Err(e), upgrade.protocols(offered.into_iter().take(1))),
    };

    tracing::debug!(session_id = %session_id, upstream = %url, "Upgrading client connection");
    Ok(upgrade.on_upgrade(move |socket| relay_session(socket, upstream, url, session_id)))
}

fn redirect_home(home_path: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, home_path.to_string())]).into_response()
}

fn method_not_allowed(mode: ProxyMode) -> Response {
    let allow = match mode {
        ProxyMode::Prefixed => "GET, HEAD",
        ProxyMode::Direct => "GET, HEAD, POST",
    };
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, allow)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: ProxyMode) -> ProxySettings {
        ProxySettings {
            mode,
            ..ProxySettings::default()
        }
    }

    fn upgrade_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, value.parse().unwrap());
        headers
    }

    #[test]
    fn prefixed_routes() {
        let s = settings(ProxyMode::Prefixed);
        let none = HeaderMap::new();

        assert_eq!(classify(&s, &Method::GET, "/", &none), Route::Home);
        assert_eq!(classify(&s, &Method::GET, "/config", &none), Route::ConfigRead);
        assert_eq!(
            classify(&s, &Method::POST, "/config", &none),
            Route::MethodNotAllowed
        );
        assert_eq!(classify(&s, &Method::GET, "/proxy", &none), Route::Http);
        assert_eq!(classify(&s, &Method::POST, "/proxy/v1/chat", &none), Route::Http);
        assert_eq!(
            classify(&s, &Method::GET, "/proxy/ws", &upgrade_headers("websocket")),
            Route::WebSocket
        );
        assert_eq!(classify(&s, &Method::GET, "/favicon.ico", &none), Route::RedirectHome);
        // Upgrade outside the prefix is still unmatched.
        assert_eq!(
            classify(&s, &Method::GET, "/ws", &upgrade_headers("websocket")),
            Route::RedirectHome
        );
    }

    #[test]
    fn direct_routes() {
        let s = settings(ProxyMode::Direct);
        let none = HeaderMap::new();

        assert_eq!(classify(&s, &Method::GET, "/", &none), Route::Home);
        assert_eq!(classify(&s, &Method::POST, "/config", &none), Route::ConfigUpdate);
        assert_eq!(classify(&s, &Method::GET, "/config", &none), Route::ConfigRead);
        assert_eq!(
            classify(&s, &Method::DELETE, "/config", &none),
            Route::MethodNotAllowed
        );
        assert_eq!(classify(&s, &Method::GET, "/anything/else", &none), Route::Http);
        assert_eq!(classify(&s, &Method::GET, "/proxy/x", &none), Route::Http);
        assert_eq!(
            classify(&s, &Method::GET, "/socket", &upgrade_headers("WebSocket")),
            Route::WebSocket
        );
    }

    #[test]
    fn upgrade_detection_is_case_insensitive_and_token_based() {
        assert!(is_websocket_upgrade(&upgrade_headers("websocket")));
        assert!(is_websocket_upgrade(&upgrade_headers("WEBSOCKET")));
        assert!(is_websocket_upgrade(&upgrade_headers("h2c, websocket")));
        assert!(!is_websocket_upgrade(&upgrade_headers("h2c")));
        assert!(!is_websocket_upgrade(&HeaderMap::new()));
    }

    #[test]
    fn set_url_param_is_decoded_and_blank_ignored() {
        let uri: Uri = "/?setUrl=https%3A%2F%2Fapi.example.com%2Fv1".parse().unwrap();
        assert_eq!(
            set_url_param(&uri).as_deref(),
            Some("https://api.example.com/v1")
        );
        assert_eq!(set_url_param(&"/?setUrl=".parse().unwrap()), None);
        assert_eq!(set_url_param(&"/?other=1".parse().unwrap()), None);
        assert_eq!(set_url_param(&"/".parse().unwrap()), None);
    }

    #[test]
    fn redirect_home_is_302() {
        let response = redirect_home("/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn oversized_body_maps_to_413() {
        let err = axum::body::to_bytes(Body::from(vec![0u8; 16]), 8)
            .await
            .unwrap_err();
        let err = body_error(err, 8);
        assert!(matches!(err, ProxyError::BodyTooLarge { limit: 8 }));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
