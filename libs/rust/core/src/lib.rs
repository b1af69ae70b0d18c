//! Core of the artifact registry: trust evaluation of ML artifacts at registration time.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub mod aggregate;
pub mod artifact;
pub mod audit;
pub mod config;
pub mod cost;
pub mod license;
pub mod lineage;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod repository;
pub mod size_score;
pub mod telemetry;

pub use aggregate::{Aggregation, Aggregator, DisqualificationReason, IncompleteEvaluation, Rating, Verdict, Weights};
pub use artifact::{Artifact, ArtifactId, ArtifactStatus, ArtifactType, NewArtifact};
pub use audit::{AuditAction, AuditEvent, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use config::{ConfigError, PipelineConfig};
pub use cost::{CostEntry, CostMap, CostResolver, GraphComputationError};
pub use license::{check_compatibility, normalize_license, LicenseCheckError, LicenseResolver, LicenseSubject, UsageContext};
pub use lineage::{LineageEdge, LineageGraph, LineageGraphBuilder, LineageNode, NodeId};
pub use metadata::{ActivitySignals, DeclaredDependency, FetchError, MetadataBundle, MetadataFetcher, PullRequestStats};
pub use metrics::{EvaluationContext, EvaluatorError, MetricEvaluator, MetricOutcome, MetricResult, MetricRole};
pub use pipeline::{Acknowledgement, EvaluationPipeline, PipelineError, PipelineState, RegistrationOutcome, RegistrationRequest, WaitError};
pub use repository::{InMemoryRepository, Repository, RepositoryError};
pub use size_score::{Platform, PlatformCapacities, SizeScores, SizeSuitabilityEvaluator};

/// Installs the global subscriber once. `RUST_LOG` filters (default `info`),
/// `REGISTRY_JSON_LOG=1|true` switches to JSON lines.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("REGISTRY_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let json_layer = json.then(|| tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr));
        let text_layer = (!json).then(|| tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .with_writer(std::io::stderr));
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "registry", service, "tracing initialized");
    Ok(())
}

/// Loads and validates [`PipelineConfig`] from defaults, the optional
/// `REGISTRY_CONFIG_FILE` and `REGISTRY__*` environment variables.
pub fn load_config(service: &str) -> Result<PipelineConfig> {
    let cfg: PipelineConfig = config::layered(service)?.try_deserialize().map_err(ConfigError::from)?;
    cfg.validate()?;
    info!(target: "registry", service, deadline_secs = cfg.evaluation_deadline_secs, threshold = cfg.acceptance_threshold, "configuration loaded");
    Ok(cfg)
}
