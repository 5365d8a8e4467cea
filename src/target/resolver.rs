//! Target resolution for both deployment modes.

use std::sync::Arc;
use url::Url;

use crate::error::ProxyError;
use crate::target::cell::TargetCell;
use crate::target::record::{TargetRecord, TargetUpdate};
use crate::target::store::SettingStore;

/// The upstream a single request is relayed to.
///
/// Each request resolves once and keeps this value, so a concurrent
/// configuration change never affects a request mid-flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTarget {
    /// Base URL joined with the remainder of the inbound path.
    BaseUrl(String),
    /// Host record with header overrides.
    Host(Arc<TargetRecord>),
}

/// Where the current target comes from.
#[derive(Debug, Clone)]
pub enum TargetResolver {
    /// Persisted single-string setting (prefixed mode).
    Persisted(Arc<dyn SettingStore>),
    /// Atomically swapped in-memory record (direct mode).
    InMemory(Arc<TargetCell>),
}

impl TargetResolver {
    /// Read the current target. `Ok(None)` means nothing was configured yet;
    /// storage failures are errors.
    pub async fn resolve(&self) -> Result<Option<ProxyTarget>, ProxyError> {
        match self {
            TargetResolver::Persisted(store) => {
                Ok(store.get().await?.map(ProxyTarget::BaseUrl))
            }
            TargetResolver::InMemory(cell) => {
                let record = cell.snapshot();
                Ok(record.is_configured().then(|| ProxyTarget::Host(record)))
            }
        }
    }

    /// Current direct-mode record, configured or not. `None` in prefixed mode.
    pub fn record(&self) -> Option<Arc<TargetRecord>> {
        match self {
            TargetResolver::Persisted(_) => None,
            TargetResolver::InMemory(cell) => Some(cell.snapshot()),
        }
    }

    /// Validate and persist a new base URL exactly as given. Invalid input,
    /// including surrounding whitespace, leaves the stored value untouched.
    pub async fn set_url(&self, raw: &str) -> Result<(), ProxyError> {
        if raw.trim() != raw {
            return Err(ProxyError::InvalidTargetInput(format!(
                "{raw:?}: surrounding whitespace"
            )));
        }
        Url::parse(raw).map_err(|e| ProxyError::InvalidTargetInput(format!("{raw}: {e}")))?;

        let TargetResolver::Persisted(store) = self else {
            return Err(ProxyError::InvalidTargetInput(
                "this proxy is configured by host record, not by URL".into(),
            ));
        };
        store.set(raw).await?;

        tracing::info!(target_url = %raw, "Proxy target updated");
        Ok(())
    }

    /// Merge a form update into the direct-mode record.
    pub fn update(&self, update: &TargetUpdate) -> Result<Arc<TargetRecord>, ProxyError> {
        let TargetResolver::InMemory(cell) = self else {
            return Err(ProxyError::InvalidTargetInput(
                "this proxy is configured by URL, not by host record".into(),
            ));
        };

        if let Some(host) = update
            .target_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
        {
            Url::parse(&format!("https://{host}"))
                .map_err(|e| ProxyError::InvalidTargetInput(format!("{host}: {e}")))?;
        }

        let record = cell.apply(update);
        tracing::info!(
            target_host = %record.target_host,
            host_header = %record.host_header,
            "Proxy target record updated"
        );
        Ok(record)
    }

    /// Replace the whole direct-mode record (config reload).
    pub fn replace(&self, record: TargetRecord) {
        if let TargetResolver::InMemory(cell) = self {
            cell.replace(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::store::MemoryStore;

    fn persisted() -> TargetResolver {
        TargetResolver::Persisted(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn unset_target_resolves_to_none() {
        assert_eq!(persisted().resolve().await.unwrap(), None);
        let in_memory = TargetResolver::InMemory(Arc::new(TargetCell::default()));
        assert_eq!(in_memory.resolve().await.unwrap(), None);
    }

    #[tokio::test]
    async fn valid_urls_round_trip_unchanged() {
        let resolver = persisted();
        for url in [
            "https://api.example.com",
            "https://api.example.com/v1/",
            "http://127.0.0.1:8080/base?x=1",
            "https://aistudio.google.com",
        ] {
            resolver.set_url(url).await.unwrap();
            assert_eq!(
                resolver.resolve().await.unwrap(),
                Some(ProxyTarget::BaseUrl(url.to_string()))
            );
        }
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_and_keeps_previous() {
        let resolver = persisted();
        resolver.set_url("https://keep.example.com").await.unwrap();

        for bad in [
            "",
            "not a url",
            "example.com",
            "http://",
            "://missing",
            " https://padded.example.com",
            "https://padded.example.com\n",
        ] {
            let err = resolver.set_url(bad).await.unwrap_err();
            assert!(matches!(err, ProxyError::InvalidTargetInput(_)), "{bad}");
        }

        assert_eq!(
            resolver.resolve().await.unwrap(),
            Some(ProxyTarget::BaseUrl("https://keep.example.com".into()))
        );
    }

    #[tokio::test]
    async fn direct_mode_update_and_resolve() {
        let resolver = TargetResolver::InMemory(Arc::new(TargetCell::default()));
        let record = resolver
            .update(&TargetUpdate {
                target_host: Some("api.example.com".into()),
                host_header: Some("api.example.com".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            resolver.resolve().await.unwrap(),
            Some(ProxyTarget::Host(record))
        );
    }

    #[tokio::test]
    async fn direct_mode_rejects_bad_host_without_mutation() {
        let cell = Arc::new(TargetCell::default());
        let resolver = TargetResolver::InMemory(cell.clone());
        let err = resolver
            .update(&TargetUpdate {
                target_host: Some("bad host/".into()),
                user_agent: Some("x".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTargetInput(_)));
        assert_eq!(*cell.snapshot(), TargetRecord::default());
    }
}
