//! Request transformation.
//!
//! Pure functions from (inbound request, resolved target) to the outbound
//! request: destination URL, copied headers, and per-target overrides.
//! Nothing here performs I/O.

use axum::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    request::Parts,
    Method, Uri,
};
use bytes::Bytes;
use url::Url;

use crate::error::ProxyError;
use crate::target::{ProxyTarget, TargetRecord};

/// Which protocol the outbound connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Http,
    WebSocket,
}

/// How inbound paths map onto the target.
#[derive(Debug, Clone, Copy)]
pub struct TransformRules<'a> {
    /// Stripped from the inbound path before joining with a base URL target.
    pub route_prefix: &'a str,
    /// Scheme family for host targets: `https`/`wss` when true, `http`/`ws` otherwise.
    pub upstream_tls: bool,
}

/// Fully built request ready to send upstream.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Headers that describe a single hop and are never relayed.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Headers the WebSocket client generates for its own handshake.
static WS_HANDSHAKE: [HeaderName; 4] = [
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::SEC_WEBSOCKET_ACCEPT,
];

/// Ordered set of headers that replace whatever was copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverrides(Vec<(HeaderName, HeaderValue)>);

impl HeaderOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override. Blank or unrepresentable values are skipped.
    pub fn with(mut self, name: HeaderName, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => self.0.push((name, v)),
            Err(_) => {
                tracing::warn!(header = %name, "Ignoring header override with invalid value");
            }
        }
        self
    }

    /// Set each override, replacing every copied value for that name.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.0 {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Request-side overrides a target imposes (`Host`, `Origin`, `User-Agent`).
pub fn request_overrides(target: &ProxyTarget) -> HeaderOverrides {
    match target {
        ProxyTarget::BaseUrl(_) => HeaderOverrides::new(),
        ProxyTarget::Host(record) => HeaderOverrides::new()
            .with(header::HOST, &record.host_header)
            .with(header::ORIGIN, &record.origin_header)
            .with(header::USER_AGENT, &record.user_agent),
    }
}

/// Response-side overrides a target imposes (CORS).
pub fn response_overrides(target: &ProxyTarget) -> HeaderOverrides {
    match target {
        ProxyTarget::BaseUrl(_) => HeaderOverrides::new(),
        ProxyTarget::Host(record) => cors_overrides(record),
    }
}

fn cors_overrides(record: &TargetRecord) -> HeaderOverrides {
    if record.access_control_allow_origin.is_empty() {
        return HeaderOverrides::new();
    }
    HeaderOverrides::new()
        .with(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            &record.access_control_allow_origin,
        )
        .with(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
}

/// Compute the upstream URL for an inbound URI.
pub fn destination_url(
    target: &ProxyTarget,
    uri: &Uri,
    rules: &TransformRules<'_>,
    channel: Channel,
) -> Result<Url, ProxyError> {
    let search = uri
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    match target {
        ProxyTarget::BaseUrl(base) => {
            let base = Url::parse(base)
                .map_err(|e| ProxyError::UrlConstruction(format!("target `{base}`: {e}")))?;

            let path = uri.path();
            let rest = path.strip_prefix(rules.route_prefix).unwrap_or(path);
            // "//host" would be read as a scheme-relative reference to another host.
            let rest = if rest.starts_with("//") {
                format!("/{}", rest.trim_start_matches('/'))
            } else {
                rest.to_string()
            };

            let mut url = base
                .join(&format!("{rest}{search}"))
                .map_err(|e| ProxyError::UrlConstruction(format!("`{rest}{search}`: {e}")))?;

            if channel == Channel::WebSocket {
                let scheme = match url.scheme() {
                    "https" | "wss" => "wss",
                    "http" | "ws" => "ws",
                    other => {
                        return Err(ProxyError::UrlConstruction(format!(
                            "scheme `{other}` cannot carry a WebSocket"
                        )))
                    }
                };
                url.set_scheme(scheme).map_err(|_| {
                    ProxyError::UrlConstruction(format!("cannot switch {url} to {scheme}"))
                })?;
            }
            Ok(url)
        }
        ProxyTarget::Host(record) => {
            let scheme = match (channel, rules.upstream_tls) {
                (Channel::Http, true) => "https",
                (Channel::Http, false) => "http",
                (Channel::WebSocket, true) => "wss",
                (Channel::WebSocket, false) => "ws",
            };
            let raw = format!("{scheme}://{}{}{search}", record.target_host, uri.path());
            Url::parse(&raw).map_err(|e| ProxyError::UrlConstruction(format!("`{raw}`: {e}")))
        }
    }
}

/// Copy inbound headers for the outbound request, then apply overrides.
///
/// Hop-by-hop headers (including any the `Connection` header names),
/// `Content-Length` and `Host` are left to the outbound transport; an
/// override can still set `Host` explicitly.
pub fn outbound_headers(
    inbound: &HeaderMap,
    overrides: &HeaderOverrides,
    channel: Channel,
) -> HeaderMap {
    let connection_listed = connection_tokens(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound {
        let skip = is_hop_by_hop(name)
            || connection_listed.iter().any(|n| n == name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || (channel == Channel::WebSocket && WS_HANDSHAKE.contains(name));
        if !skip {
            headers.append(name.clone(), value.clone());
        }
    }

    overrides.apply(&mut headers);
    headers
}

/// Copy upstream response headers for the client, then apply overrides.
pub fn response_headers(upstream: &HeaderMap, overrides: &HeaderOverrides) -> HeaderMap {
    let connection_listed = connection_tokens(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if !is_hop_by_hop(name) && !connection_listed.iter().any(|n| n == name) {
            headers.append(name.clone(), value.clone());
        }
    }

    overrides.apply(&mut headers);
    headers
}

/// Build the outbound request for an inbound one.
pub fn transform(
    parts: &Parts,
    body: Bytes,
    target: &ProxyTarget,
    rules: &TransformRules<'_>,
) -> Result<OutboundRequest, ProxyError> {
    let url = destination_url(target, &parts.uri, rules, Channel::Http)?;
    let headers = outbound_headers(&parts.headers, &request_overrides(target), Channel::Http);

    Ok(OutboundRequest {
        method: parts.method.clone(),
        url,
        headers,
        body,
    })
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || name.as_str() == "keep-alive"
}

fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}
