//! Target resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Prefixed mode:
//!     home page ?setUrl=  → resolver.set_url (validate) → store.rs (persist)
//!     proxy request       → resolver.resolve → store.rs (read) → BaseUrl
//!
//! Direct mode:
//!     POST /config        → resolver.update → cell.rs (read-copy-update)
//!     config reload       → resolver.replace → cell.rs (swap)
//!     proxy request       → resolver.resolve → cell.rs (snapshot) → Host
//! ```
//!
//! At any instant there is zero or one target. Every request resolves
//! exactly once, before its outbound request is built.

pub mod cell;
pub mod record;
pub mod resolver;
pub mod store;

pub use cell::TargetCell;
pub use record::{TargetRecord, TargetUpdate};
pub use resolver::{ProxyTarget, TargetResolver};
pub use store::{FileStore, MemoryStore, SettingStore, StoreError};
