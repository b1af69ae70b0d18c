//! Trust metrics computed over a metadata snapshot.
//!
//! Every metric is a [`MetricEvaluator`] registered in a list; the pipeline
//! fans the list out and the aggregator only ever sees [`MetricResult`]s, so a
//! new metric needs a registration and (optionally) a configured weight,
//! nothing else.

use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lineage::{LineageGraph, NodeId};
use crate::metadata::MetadataBundle;

mod availability;
mod community;
mod documentation;
mod license;
mod tree;

pub use availability::{CodeQuality, DatasetAndCodeScore, DatasetQuality};
pub use community::{BusFactor, Reviewedness};
pub use documentation::{PerformanceClaims, RampUpTime, Reproducibility};
pub use license::LicenseMetric;
pub use tree::TreeScore;

pub mod names {
    pub const RAMP_UP_TIME: &str = "ramp_up_time";
    pub const BUS_FACTOR: &str = "bus_factor";
    pub const PERFORMANCE_CLAIMS: &str = "performance_claims";
    pub const LICENSE: &str = "license";
    pub const DATASET_AND_CODE_SCORE: &str = "dataset_and_code_score";
    pub const DATASET_QUALITY: &str = "dataset_quality";
    pub const CODE_QUALITY: &str = "code_quality";
    pub const REPRODUCIBILITY: &str = "reproducibility";
    pub const REVIEWEDNESS: &str = "reviewedness";
    pub const TREE_SCORE: &str = "tree_score";
}

/// Read-only input shared by all evaluators of one run.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub root: NodeId,
    pub metadata: Arc<MetadataBundle>,
    pub lineage: Arc<LineageGraph>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricRole {
    /// Contributes to the net score with its configured weight.
    Weighted,
    /// A score of 0 rejects the artifact outright.
    Gate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluatorError {
    #[error("required signal missing: {0}")]
    MissingSignal(&'static str),
    #[error("score {0} outside [0, 1]")]
    OutOfRange(f64),
    #[error("evaluator panicked: {0}")]
    Panicked(String),
    #[error("evaluation deadline elapsed")]
    DeadlineElapsed,
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome {
    Scored { score: f64 },
    Errored { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub role: MetricRole,
    #[serde(flatten)]
    pub outcome: MetricOutcome,
    pub latency_secs: f64,
}

impl MetricResult {
    pub fn scored(name: impl Into<String>, role: MetricRole, score: f64, latency_secs: f64) -> Self {
        Self { name: name.into(), role, outcome: MetricOutcome::Scored { score }, latency_secs }
    }

    pub fn errored(name: impl Into<String>, role: MetricRole, error: &EvaluatorError, latency_secs: f64) -> Self {
        Self { name: name.into(), role, outcome: MetricOutcome::Errored { error: error.to_string() }, latency_secs }
    }

    pub fn score(&self) -> Option<f64> {
        match self.outcome { MetricOutcome::Scored { score } => Some(score), MetricOutcome::Errored { .. } => None }
    }

    pub fn is_errored(&self) -> bool { matches!(self.outcome, MetricOutcome::Errored { .. }) }
}

#[async_trait]
pub trait MetricEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> MetricRole { MetricRole::Weighted }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError>;
}

/// Runs one evaluator and never fails: errors, panics and out-of-range scores
/// all become an errored [`MetricResult`].
pub async fn evaluate_guarded(evaluator: &dyn MetricEvaluator, ctx: &EvaluationContext) -> MetricResult {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(evaluator.evaluate(ctx)).catch_unwind().await;
    let latency = start.elapsed().as_secs_f64();
    let result = match outcome {
        Ok(Ok(score)) if (0.0..=1.0).contains(&score) => Ok(score),
        Ok(Ok(score)) => Err(EvaluatorError::OutOfRange(score)),
        Ok(Err(e)) => Err(e),
        Err(panic) => Err(EvaluatorError::Panicked(panic_message(panic.as_ref()))),
    };
    match result {
        Ok(score) => {
            debug!(metric = evaluator.name(), score, latency_ms = latency * 1000.0, "metric scored");
            MetricResult::scored(evaluator.name(), evaluator.role(), score, latency)
        }
        Err(e) => {
            warn!(metric = evaluator.name(), error = %e, "metric errored");
            MetricResult::errored(evaluator.name(), evaluator.role(), &e, latency)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() { return (*s).to_string(); }
    if let Some(s) = payload.downcast_ref::<String>() { return s.clone(); }
    "non-string panic payload".to_string()
}

/// The ten built-in evaluators.
pub fn default_evaluators() -> Vec<Arc<dyn MetricEvaluator>> {
    vec![
        Arc::new(RampUpTime),
        Arc::new(BusFactor),
        Arc::new(PerformanceClaims),
        Arc::new(LicenseMetric),
        Arc::new(DatasetAndCodeScore),
        Arc::new(DatasetQuality),
        Arc::new(CodeQuality),
        Arc::new(Reproducibility),
        Arc::new(Reviewedness),
        Arc::new(TreeScore),
    ]
}

/// Case-insensitive keyword set; counts how many distinct keywords occur.
pub(crate) struct KeywordSet { matcher: Option<AhoCorasick>, len: usize }

impl KeywordSet {
    pub(crate) fn new(words: &[&str]) -> Self {
        let matcher = AhoCorasick::builder().ascii_case_insensitive(true).match_kind(MatchKind::Standard).build(words).ok();
        Self { matcher, len: words.len() }
    }

    pub(crate) fn distinct_hits(&self, text: &str) -> usize {
        let Some(ac) = &self.matcher else { return 0 };
        let mut seen = vec![false; self.len];
        for m in ac.find_overlapping_iter(text) { seen[m.pattern().as_usize()] = true; }
        seen.into_iter().filter(|s| *s).count()
    }
}
