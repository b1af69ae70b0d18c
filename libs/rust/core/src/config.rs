//! Pipeline configuration: serde defaults, layered sources, validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::aggregate::Weights;
use crate::size_score::{Platform, PlatformCapacities};

pub const CONFIG_FILE_ENV: &str = "REGISTRY_CONFIG_FILE";
pub const ENV_PREFIX: &str = "REGISTRY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// One deadline for fetch plus evaluator fan-out.
    pub evaluation_deadline_secs: f64,
    /// Default interval for deferred-mode polling.
    pub poll_interval_secs: f64,
    /// Net scores strictly below this are disqualified.
    pub acceptance_threshold: f64,
    pub weights: Weights,
    pub platform_capacities_mb: PlatformCapacities,
    pub max_concurrent_evaluators: usize,
    /// Size assumed when the metadata declares none.
    pub fallback_size_mb: f64,
    /// Finished runs kept in the job table; the oldest are evicted first.
    pub max_tracked_jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            evaluation_deadline_secs: 30.0,
            poll_interval_secs: 1.0,
            acceptance_threshold: 0.5,
            weights: Weights::default(),
            platform_capacities_mb: PlatformCapacities::default(),
            max_concurrent_evaluators: 8,
            fallback_size_mb: 500.0,
            max_tracked_jobs: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration { Duration::from_secs_f64(self.evaluation_deadline_secs) }

    pub fn poll_interval(&self) -> Duration { Duration::from_secs_f64(self.poll_interval_secs) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(self.evaluation_deadline_secs.is_finite() && self.evaluation_deadline_secs > 0.0) {
            return invalid(format!("evaluation_deadline_secs must be positive, got {}", self.evaluation_deadline_secs));
        }
        if !(self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0) {
            return invalid(format!("poll_interval_secs must be positive, got {}", self.poll_interval_secs));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return invalid(format!("acceptance_threshold must lie in [0, 1], got {}", self.acceptance_threshold));
        }
        if let Some((name, w)) = self.weights.0.iter().find(|(_, w)| !(w.is_finite() && **w >= 0.0)) {
            return invalid(format!("weight for {name} must be non-negative, got {w}"));
        }
        if (self.weights.total() - 1.0).abs() > 1e-3 {
            return invalid(format!("weights must sum to 1.0, got {:.4}", self.weights.total()));
        }
        for p in Platform::ALL {
            let cap = self.platform_capacities_mb.capacity(p);
            if !(cap.is_finite() && cap > 0.0) { return invalid(format!("capacity for {p:?} must be positive, got {cap}")); }
        }
        if self.max_concurrent_evaluators == 0 { return invalid("max_concurrent_evaluators must be at least 1".into()); }
        if self.max_tracked_jobs == 0 { return invalid("max_tracked_jobs must be at least 1".into()); }
        if !(self.fallback_size_mb.is_finite() && self.fallback_size_mb >= 0.0) {
            return invalid(format!("fallback_size_mb must be non-negative, got {}", self.fallback_size_mb));
        }
        Ok(())
    }
}

/// Layered sources: built-in defaults, then the optional file named by
/// `REGISTRY_CONFIG_FILE`, then `REGISTRY__*` environment variables.
///
/// Default weights are registered key by key so that overriding one weight
/// keeps the others.
pub fn layered(service: &str) -> Result<config::Config, ConfigError> {
    let defaults = PipelineConfig::default();
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("evaluation_deadline_secs", defaults.evaluation_deadline_secs)?
        .set_default("poll_interval_secs", defaults.poll_interval_secs)?
        .set_default("acceptance_threshold", defaults.acceptance_threshold)?;
    for (name, w) in &defaults.weights.0 {
        builder = builder.set_default(format!("weights.{name}"), *w)?;
    }
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.deadline(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.acceptance_threshold = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = PipelineConfig::default();
        cfg.weights.0.insert("bus_factor".into(), 0.3);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.max_concurrent_evaluators = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.max_tracked_jobs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.platform_capacities_mb.edge_device = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let cfg: PipelineConfig = serde_json::from_value(serde_json::json!({
            "acceptance_threshold": 0.6,
            "platform_capacities_mb": { "edge_device": 2048.0 }
        })).unwrap();
        assert_eq!(cfg.acceptance_threshold, 0.6);
        assert_eq!(cfg.platform_capacities_mb.edge_device, 2048.0);
        assert_eq!(cfg.platform_capacities_mb.server_class, 65536.0);
        assert_eq!(cfg.max_concurrent_evaluators, 8);
    }

    #[test]
    fn layered_defaults_deserialize() {
        let cfg: PipelineConfig = layered("test").unwrap().try_deserialize().unwrap();
        assert_eq!(cfg.weights, Weights::default());
    }
}
