use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Outbound HTTP settings, read from the `worker` section (`REGISTRY__WORKER__*`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub hf_api_base: String,
    pub github_api_base: String,
    pub github_token: Option<String>,
    pub http_timeout_secs: f64,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_secs: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            hf_api_base: "https://huggingface.co".into(),
            github_api_base: "https://api.github.com".into(),
            github_token: None,
            http_timeout_secs: 10.0,
            retry_attempts: 3,
            retry_base_delay_ms: 200,
            breaker_failure_threshold: 5,
            breaker_reset_secs: 30.0,
        }
    }
}

impl WorkerConfig {
    pub fn http_timeout(&self) -> Duration { Duration::from_secs_f64(self.http_timeout_secs.max(0.1)) }

    pub fn breaker_reset(&self) -> Duration { Duration::from_secs_f64(self.breaker_reset_secs.max(0.0)) }
}

#[derive(Debug, Default, Deserialize)]
struct Root { #[serde(default)] worker: WorkerConfig }

pub fn load(service: &str) -> Result<WorkerConfig> {
    let root: Root = registry_core::config::layered(service)?.try_deserialize()?;
    let mut cfg = root.worker;
    if cfg.github_token.is_none() {
        cfg.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty());
    }
    Ok(cfg)
}
