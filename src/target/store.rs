//! Single-value setting storage backing the prefixed-mode target.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Get/set of one string value.
///
/// `get` returns `Ok(None)` only when nothing was ever stored; I/O failures
/// are errors.
#[async_trait]
pub trait SettingStore: Send + Sync + std::fmt::Debug {
    async fn get(&self) -> Result<Option<String>, StoreError>;
    async fn set(&self, value: &str) -> Result<(), StoreError>;
}

/// Process-local store, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: ArcSwapOption<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingStore for MemoryStore {
    async fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self.value.load_full().map(|v| v.as_ref().clone()))
    }

    async fn set(&self, value: &str) -> Result<(), StoreError> {
        self.value.store(Some(Arc::new(value.to_string())));
        Ok(())
    }
}

/// Store persisted in a single file.
///
/// Each write goes to its own sibling temp file that is then renamed over
/// the target, so overlapping writers never share a file and a concurrent
/// `get` sees either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = std::ffi::OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingStore for FileStore {
    async fn get(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let value = content.trim_end_matches(['\r', '\n']);
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn set(&self, value: &str) -> Result<(), StoreError> {
        let tmp = self.temp_path();
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let written = match tokio::fs::write(&tmp, format!("{value}\n")).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(source));
        }

        tracing::debug!(path = %self.path.display(), "Target setting persisted");
        Ok(())
    }
}
