//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → dispatch.rs (classify: config page / WebSocket / HTTP / redirect)
//!     → target resolver (one snapshot per request)
//!     → transform.rs (destination URL, header copy + overrides)
//!     → relay.rs (reqwest, streamed response)
//!       or websocket.rs (upgrade, upstream connect, two linked pumps)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod pages;
pub mod relay;
pub mod server;
pub mod transform;
pub mod websocket;

pub use dispatch::{classify, Route};
pub use server::{AppState, HttpServer};
