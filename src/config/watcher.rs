//! Configuration file watcher for hot reload.
//!
//! Watches the directory that holds the file rather than the file itself:
//! editors and deploy tools often replace a file by renaming a new one over
//! it, which would silently end a watch on the old inode.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Sends a freshly validated [`ProxyConfig`] whenever the file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &path) => reload(&path, &tx),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` changed the watched file's contents.
fn touches(event: &Event, path: &Path) -> bool {
    let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<ProxyConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Configuration reloaded");
            let _ = tx.send(config);
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Config reload failed, keeping current configuration"
            );
        }
    }
}
