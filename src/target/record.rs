//! Direct-mode target record and its partial update.

use serde::{Deserialize, Serialize};

use crate::config::TargetConfig;

/// Upstream host plus header overrides.
///
/// Empty strings mean "not configured"; an empty `target_host` means no
/// target at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub target_host: String,
    pub host_header: String,
    pub origin_header: String,
    pub user_agent: String,
    pub access_control_allow_origin: String,
}

impl TargetRecord {
    pub fn is_configured(&self) -> bool {
        !self.target_host.is_empty()
    }

    /// Build the record that results from applying `update` on top of `self`.
    pub fn merged(&self, update: &TargetUpdate) -> Self {
        fn pick(current: &str, new: &Option<String>) -> String {
            match new.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => current.to_string(),
            }
        }

        Self {
            target_host: pick(&self.target_host, &update.target_host),
            host_header: pick(&self.host_header, &update.host_header),
            origin_header: pick(&self.origin_header, &update.origin_header),
            user_agent: pick(&self.user_agent, &update.user_agent),
            access_control_allow_origin: pick(
                &self.access_control_allow_origin,
                &update.access_control_allow_origin,
            ),
        }
    }
}

impl From<&TargetConfig> for TargetRecord {
    fn from(config: &TargetConfig) -> Self {
        Self {
            target_host: config.target_host.trim().to_string(),
            host_header: config.host_header.trim().to_string(),
            origin_header: config.origin_header.trim().to_string(),
            user_agent: config.user_agent.trim().to_string(),
            access_control_allow_origin: config.access_control_allow_origin.trim().to_string(),
        }
    }
}

/// Form submission to `POST /config`. Omitted or blank fields keep their
/// previous value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUpdate {
    pub target_host: Option<String>,
    pub host_header: Option<String>,
    pub origin_header: Option<String>,
    pub user_agent: Option<String>,
    pub access_control_allow_origin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TargetRecord {
        TargetRecord {
            target_host: "old.example.com".into(),
            host_header: "old.example.com".into(),
            origin_header: "https://old.example.com".into(),
            user_agent: "agent/1".into(),
            access_control_allow_origin: "*".into(),
        }
    }

    #[test]
    fn omitted_and_blank_fields_keep_prior_value() {
        let update = TargetUpdate {
            target_host: Some("new.example.com".into()),
            user_agent: Some("   ".into()),
            ..Default::default()
        };

        let merged = record().merged(&update);
        assert_eq!(merged.target_host, "new.example.com");
        assert_eq!(merged.host_header, "old.example.com");
        assert_eq!(merged.user_agent, "agent/1");
        assert_eq!(merged.access_control_allow_origin, "*");
    }

    #[test]
    fn form_fields_are_camel_case() {
        let update: TargetUpdate =
            serde_json::from_str(r#"{"targetHost":"a.example","accessControlAllowOrigin":"*"}"#)
                .unwrap();
        assert_eq!(update.target_host.as_deref(), Some("a.example"));
        assert_eq!(update.access_control_allow_origin.as_deref(), Some("*"));
        assert!(update.host_header.is_none());
    }

    #[test]
    fn default_record_is_unconfigured() {
        assert!(!TargetRecord::default().is_configured());
        assert!(record().is_configured());
    }
}
