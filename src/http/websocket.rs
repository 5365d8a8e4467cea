//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish the WebSocket connection to the upstream (tokio-tungstenite)
//! - Complete the upgrade handshake with the client (axum), echoing the
//!   subprotocol the upstream selected
//! - Bidirectional frame forwarding with linked closure
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Upstream
//!              pump: client → upstream ──┐
//!              pump: upstream → client ──┴── shared CancellationToken
//! ```
//!
//! # Design Decisions
//! - Each direction is its own task; whichever ends first cancels the other
//! - Frame-level forwarding, one frame at a time, no buffering or inspection
//! - Text, binary and close frames are relayed; ping/pong stay per hop
//! - Upstream connect failure closes the client with an error code

use axum::extract::ws::{
    close_code, CloseFrame as ClientCloseFrame, Message as ClientMessage, Utf8Bytes, WebSocket,
};
use axum::http::{header, HeaderMap};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
    Message as UpstreamMessage,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::observability::metrics;

/// Upstream side of a relay session.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on how long a closing sink may take to flush its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Direction of a pump within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// Its source sent a close frame or ended the stream.
    Closed,
    /// The opposite pump ended first.
    Cancelled,
    ReadFailed(String),
    WriteFailed(String),
    /// The pump task itself died.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpReport {
    /// Data frames forwarded (close frames excluded).
    pub frames: u64,
    pub end: PumpEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub client_to_upstream: PumpReport,
    pub upstream_to_client: PumpReport,
}

/// What a received frame turns into on the other side.
enum Forward<M> {
    Frame(M),
    Close(M),
    Skip,
}

/// An upstream connection plus the subprotocol it selected, if any.
pub struct UpstreamHandshake {
    pub socket: UpstreamSocket,
    pub protocol: Option<String>,
}

/// Subprotocols the client offered, in preference order.
pub fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Open the upstream WebSocket, sending `headers` with the handshake.
pub async fn connect_upstream(url: &Url, headers: &HeaderMap) -> Result<UpstreamHandshake, ProxyError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(ProxyError::UpstreamConnect)?;

    for (name, value) in headers {
        if name == header::HOST {
            request.headers_mut().insert(name.clone(), value.clone());
        } else {
            request.headers_mut().append(name.clone(), value.clone());
        }
    }

    let (socket, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(ProxyError::UpstreamConnect)?;

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::debug!(
        upstream = %url,
        status = response.status().as_u16(),
        protocol = ?protocol,
        "Upstream WebSocket handshake complete"
    );
    Ok(UpstreamHandshake { socket, protocol })
}

/// Body of the upgrade callback: relay until either side closes, or refuse
/// the client when the upstream could not be reached.
pub async fn relay_session(
    client: WebSocket,
    upstream: Result<UpstreamSocket, ProxyError>,
    url: Url,
    session_id: Uuid,
) {
    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(session_id = %session_id, upstream = %url, error = %e, "Upstream WebSocket unavailable");
            refuse_client(client).await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, upstream = %url, "WebSocket session open");
    let report = run_session(client, upstream, session_id).await;
    tracing::info!(
        session_id = %session_id,
        client_frames = report.client_to_upstream.frames,
        upstream_frames = report.upstream_to_client.frames,
        client_end = ?report.client_to_upstream.end,
        upstream_end = ?report.upstream_to_client.end,
        "WebSocket session closed"
    );
}

/// The handshake response is already sent, so the client learns about the
/// failed upstream through an error close frame.
async fn refuse_client(mut client: WebSocket) {
    let frame = ClientCloseFrame {
        code: close_code::ERROR,
        reason: Utf8Bytes::from_static("upstream unavailable"),
    };
    if client.send(ClientMessage::Close(Some(frame))).await.is_ok() {
        // Give the client a moment to answer so the TCP close is orderly.
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, client.recv()).await;
    }
}

/// Pump frames both ways until one side closes, then close the other.
pub async fn run_session(client: WebSocket, upstream: UpstreamSocket, session_id: Uuid) -> SessionReport {
    let (client_tx, client_rx) = client.split();
    let (upstream_tx, upstream_rx) = upstream.split();
    let cancel = CancellationToken::new();
    // Dropping this future (e.g. server shutdown) stops both pumps.
    let _guard = cancel.clone().drop_guard();

    metrics::websocket_session_opened();

    let c2u = tokio::spawn(pump(
        client_rx,
        upstream_tx,
        client_to_upstream,
        cancel.clone(),
        Direction::ClientToUpstream,
        session_id,
    ));
    let u2c = tokio::spawn(pump(
        upstream_rx,
        client_tx,
        upstream_to_client,
        cancel.clone(),
        Direction::UpstreamToClient,
        session_id,
    ));

    let (c2u, u2c) = tokio::join!(c2u, u2c);
    let report = SessionReport {
        client_to_upstream: c2u.unwrap_or_else(aborted),
        upstream_to_client: u2c.unwrap_or_else(aborted),
    };

    metrics::websocket_session_closed();
    metrics::record_ws_frames(Direction::ClientToUpstream.as_str(), report.client_to_upstream.frames);
    metrics::record_ws_frames(Direction::UpstreamToClient.as_str(), report.upstream_to_client.frames);
    report
}

fn aborted(e: tokio::task::JoinError) -> PumpReport {
    PumpReport {
        frames: 0,
        end: PumpEnd::Aborted(e.to_string()),
    }
}

/// Forward frames from `source` to `sink` until the source closes, an I/O
/// error occurs, or `cancel` fires. Always cancels on exit so the opposite
/// pump unwinds too.
async fn pump<S, K, In, Out, SE, KE>(
    mut source: S,
    mut sink: K,
    convert: fn(In) -> Forward<Out>,
    cancel: CancellationToken,
    direction: Direction,
    session_id: Uuid,
) -> PumpReport
where
    S: Stream<Item = Result<In, SE>> + Unpin,
    K: Sink<Out, Error = KE> + Unpin,
    SE: Display,
    KE: Display,
{
    let mut frames = 0u64;

    let end = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            next = source.next() => next,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, direction = direction.as_str(), error = %e, "WebSocket read failed");
                break PumpEnd::ReadFailed(e.to_string());
            }
            None => break PumpEnd::Closed,
        };

        let (out, closing) = match convert(msg) {
            Forward::Frame(out) => (out, false),
            Forward::Close(out) => (out, true),
            Forward::Skip => continue,
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            sent = sink.send(out) => sent,
        };
        if let Err(e) = sent {
            tracing::warn!(session_id = %session_id, direction = direction.as_str(), error = %e, "WebSocket write failed");
            break PumpEnd::WriteFailed(e.to_string());
        }

        if closing {
            break PumpEnd::Closed;
        }
        frames += 1;
    };

    cancel.cancel();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;

    tracing::debug!(session_id = %session_id, direction = direction.as_str(), frames, end = ?end, "Pump stopped");
    PumpReport { frames, end }
}

fn client_to_upstream(msg: ClientMessage) -> Forward<UpstreamMessage> {
    match msg {
        ClientMessage::Text(text) => Forward::Frame(UpstreamMessage::text(text.as_str())),
        ClientMessage::Binary(data) => Forward::Frame(UpstreamMessage::binary(data)),
        ClientMessage::Close(frame) => Forward::Close(UpstreamMessage::Close(frame.map(|f| {
            UpstreamCloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.as_str().into(),
            }
        }))),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => Forward::Skip,
    }
}

fn upstream_to_client(msg: UpstreamMessage) -> Forward<ClientMessage> {
    match msg {
        UpstreamMessage::Text(text) => Forward::Frame(ClientMessage::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Forward::Frame(ClientMessage::Binary(data)),
        UpstreamMessage::Close(frame) => Forward::Close(ClientMessage::Close(frame.map(|f| {
            ClientCloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().into(),
            }
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => {
            Forward::Skip
        }
    }
}
