//! Proxy error taxonomy and its mapping onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::target::StoreError;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Rejected at configuration time; stored state is untouched.
    #[error("invalid target URL: {0}")]
    InvalidTargetInput(String),

    #[error("no proxy target configured, set one on the home page first")]
    NoTargetConfigured,

    #[error("could not construct upstream URL: {0}")]
    UrlConstruction(String),

    #[error("upstream request failed: {0}")]
    UpstreamUnavailable(#[source] reqwest::Error),

    #[error("upstream WebSocket connection failed: {0}")]
    UpstreamConnect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("relay I/O error: {0}")]
    RelayIo(String),

    #[error("failed to read request body: {0}")]
    InboundBody(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("target storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTargetInput(_)
            | ProxyError::NoTargetConfigured
            | ProxyError::InboundBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UrlConstruction(_) | ProxyError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::UpstreamUnavailable(_)
            | ProxyError::UpstreamConnect(_)
            | ProxyError::RelayIo(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Proxy request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Proxy request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
