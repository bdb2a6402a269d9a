//! Vetting configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checks::APPROVED_CHECK;
use crate::error::{VetError, VetResult};

/// Configuration for a vetting engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetConfig {
    /// Maximum number of checks evaluated at once within a run.
    pub max_concurrent_checks: usize,
    /// Deadline for a whole run, in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Cancel sibling checks as soon as one check errors.
    pub fail_fast: bool,
    /// Write an attestation occurrence when a run passes.
    pub publish: bool,
    /// Checks to build from the registry, by name. Defaults to `approved`
    /// only; `diy` fails every image while `trusted_prefixes` is empty.
    pub enabled_checks: Vec<String>,
    /// Registry prefixes trusted by the `diy` check.
    pub trusted_prefixes: Vec<String>,
}

impl Default for VetConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 4,
            deadline_ms: None,
            fail_fast: false,
            publish: true,
            enabled_checks: vec![APPROVED_CHECK.to_string()],
            trusted_prefixes: Vec::new(),
        }
    }
}

impl VetConfig {
    /// Parse from a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> VetResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VetResult<()> {
        if self.deadline_ms == Some(0) {
            return Err(VetError::InvalidConfig(
                "deadline_ms must be greater than zero".to_string(),
            ));
        }
        if self.enabled_checks.iter().any(|c| c.trim().is_empty()) {
            return Err(VetError::InvalidConfig(
                "enabled_checks contains an empty name".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective fan-out limit (never below one).
    pub fn fan_out(&self) -> usize {
        self.max_concurrent_checks.max(1)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn with_checks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_checks = names.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VetConfig::default();
        assert_eq!(config.fan_out(), 4);
        assert!(!config.fail_fast);
        assert!(config.publish);
        assert_eq!(config.deadline(), None);
        assert_eq!(config.enabled_checks, vec!["approved".to_string()]);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            VetConfig::from_json_str(r#"{ "deadline_ms": 1500, "enabled_checks": ["approved"] }"#)
                .unwrap();
        assert_eq!(config.deadline(), Some(Duration::from_millis(1500)));
        assert_eq!(config.enabled_checks, vec!["approved".to_string()]);
        assert_eq!(config.max_concurrent_checks, 4);
    }

    #[test]
    fn test_zero_fan_out_is_clamped() {
        let config = VetConfig {
            max_concurrent_checks: 0,
            ..VetConfig::default()
        };
        assert_eq!(config.fan_out(), 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            VetConfig::from_json_str(r#"{ "deadline_ms": 0 }"#),
            Err(VetError::InvalidConfig(_))
        ));
        assert!(matches!(
            VetConfig::from_json_str(r#"{ "enabled_checks": [" "] }"#),
            Err(VetError::InvalidConfig(_))
        ));
        assert!(matches!(
            VetConfig::from_json_str("not json"),
            Err(VetError::Serialization(_))
        ));
    }
}
