//! HTTP relay.
//!
//! Sends one outbound request per inbound request (no retries) and streams
//! the upstream response back. Redirects are followed by the client, so the
//! caller only ever sees the final upstream response.
//!
//! When the downstream client goes away, axum drops the response body,
//! which drops the upstream body stream and releases that connection.

use axum::{body::Body, response::Response};
use futures_util::TryStreamExt;
use std::time::Duration;

use crate::error::ProxyError;
use crate::http::transform::{response_headers, HeaderOverrides, OutboundRequest};

/// Maximum redirects followed before the last redirect is returned as-is.
const MAX_REDIRECTS: usize = 10;

/// Build the shared upstream client.
///
/// `use_env_proxy` controls whether `HTTP_PROXY`-style variables apply to
/// upstream traffic.
pub fn build_client(use_env_proxy: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .tcp_keepalive(Duration::from_secs(60));
    if !use_env_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}

/// Execute `outbound` and turn the upstream response into a client response.
pub async fn relay(
    client: &reqwest::Client,
    outbound: OutboundRequest,
    overrides: &HeaderOverrides,
) -> Result<Response, ProxyError> {
    let OutboundRequest {
        method,
        url,
        headers,
        body,
    } = outbound;

    tracing::debug!(method = %method, upstream = %url, "Forwarding request");

    let upstream = client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(ProxyError::UpstreamUnavailable)?;

    let status = upstream.status();
    let headers = response_headers(upstream.headers(), overrides);
    let final_url = upstream.url().clone();

    tracing::debug!(status = status.as_u16(), upstream = %final_url, "Upstream responded");

    let stream = upstream.bytes_stream().map_err(move |e| {
        tracing::warn!(upstream = %final_url, error = %e, "Upstream body interrupted");
        ProxyError::RelayIo(e.to_string())
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
