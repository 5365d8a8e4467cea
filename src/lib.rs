//! Reconfigurable reverse proxy library.
//!
//! The upstream target can be changed at runtime: in `prefixed` mode it is a
//! persisted base URL and only paths under the route prefix are relayed; in
//! `direct` mode it is an in-memory host record with header overrides and
//! every path outside the configuration pages is relayed.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod target;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
