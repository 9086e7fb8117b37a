//! Coordinator configuration.
//!
//! # Responsibility
//! - Carry deployment flags and thresholds into the coordinator explicitly.
//! - Parse the environment-sourced deployment settings.
//!
//! # Invariants
//! - Gating decisions read this struct only, never the process environment.
//! - Unset or unrecognised flags fall back to defaults.
//! - A malformed threshold is rejected.

use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Enables extended (enterprise) capabilities such as AI summaries.
pub const ENV_EXTENDED_ENABLED: &str = "EE_ENABLED";
/// Signals that the asynchronous job backend is reachable.
pub const ENV_JOB_BACKEND_AVAILABLE: &str = "REDIS";
/// Fingerprint count an incident must exceed before a summary is generated.
pub const ENV_SUMMARY_THRESHOLD: &str = "MIN_INCIDENT_ALERTS_FOR_SUMMARY_GENERATION";

/// Default fingerprint threshold for summary generation.
pub const DEFAULT_SUMMARY_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidThreshold { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidThreshold { key, value } => {
                write!(f, "`{key}` must be a non-negative integer, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Capability and threshold settings for the mutation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub extended_enabled: bool,
    pub job_backend_available: bool,
    /// Unique fingerprint count must be strictly greater than this.
    pub summary_threshold: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            extended_enabled: false,
            job_backend_available: false,
            summary_threshold: DEFAULT_SUMMARY_THRESHOLD,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_extended_enabled(mut self, enabled: bool) -> Self {
        self.extended_enabled = enabled;
        self
    }

    pub fn with_job_backend_available(mut self, available: bool) -> Self {
        self.job_backend_available = available;
        self
    }

    pub fn with_summary_threshold(mut self, threshold: u64) -> Self {
        self.summary_threshold = threshold;
        self
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            extended_enabled: parse_flag(
                ENV_EXTENDED_ENABLED,
                lookup(ENV_EXTENDED_ENABLED),
                defaults.extended_enabled,
            ),
            job_backend_available: parse_flag(
                ENV_JOB_BACKEND_AVAILABLE,
                lookup(ENV_JOB_BACKEND_AVAILABLE),
                defaults.job_backend_available,
            ),
            summary_threshold: parse_threshold(lookup(ENV_SUMMARY_THRESHOLD))?
                .unwrap_or(defaults.summary_threshold),
        })
    }
}

/// Only the literal `true` enables a flag; unrecognised values keep `default`.
fn parse_flag(key: &'static str, value: Option<String>, default: bool) -> bool {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "true" => true,
        "false" => false,
        _ => {
            warn!(
                "event=config_flag module=config status=error key={key} value_len={} fallback={default}",
                raw.len()
            );
            default
        }
    }
}

fn parse_threshold(value: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidThreshold {
            key: ENV_SUMMARY_THRESHOLD,
            value: raw.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, CoordinatorConfig, ENV_EXTENDED_ENABLED, ENV_JOB_BACKEND_AVAILABLE,
        ENV_SUMMARY_THRESHOLD,
    };
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[])).expect("defaults parse");
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.summary_threshold, 5);
        assert!(!config.extended_enabled);
        assert!(!config.job_backend_available);
    }

    #[test]
    fn flags_are_case_insensitive() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            (ENV_EXTENDED_ENABLED, "TRUE"),
            (ENV_JOB_BACKEND_AVAILABLE, " true "),
            (ENV_SUMMARY_THRESHOLD, "10"),
        ]))
        .expect("valid settings parse");
        assert!(config.extended_enabled);
        assert!(config.job_backend_available);
        assert_eq!(config.summary_threshold, 10);
    }

    #[test]
    fn unrecognised_flag_values_fall_back_to_default() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            (ENV_EXTENDED_ENABLED, "yes"),
            (ENV_JOB_BACKEND_AVAILABLE, "1"),
            (ENV_SUMMARY_THRESHOLD, "3"),
        ]))
        .expect("unrecognised flags are not errors");
        assert!(!config.extended_enabled);
        assert!(!config.job_backend_available);
        assert_eq!(config.summary_threshold, 3);

        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            (ENV_EXTENDED_ENABLED, "false"),
            (ENV_JOB_BACKEND_AVAILABLE, "   "),
        ]))
        .expect("explicit false and blank parse");
        assert_eq!(config, CoordinatorConfig::default());
    }

    #[test]
    fn rejects_malformed_threshold() {
        let err = CoordinatorConfig::from_lookup(lookup_from(&[(ENV_SUMMARY_THRESHOLD, "five")]))
            .expect_err("non-numeric threshold must fail");
        assert!(matches!(err, ConfigError::InvalidThreshold { .. }));
    }
}
