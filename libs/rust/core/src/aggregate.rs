//! Fan-in of metric results into a net score and an acceptance verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

use crate::artifact::{ArtifactId, ArtifactType};
use crate::metrics::{names, MetricResult, MetricRole};
use crate::size_score::SizeScores;

/// Per-metric weights keyed by metric name. Unlisted metrics weigh 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weights(pub BTreeMap<String, f64>);

impl Default for Weights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (names::RAMP_UP_TIME.to_string(), 0.20),
            (names::BUS_FACTOR.to_string(), 0.10),
            (names::PERFORMANCE_CLAIMS.to_string(), 0.10),
            (names::DATASET_AND_CODE_SCORE.to_string(), 0.10),
            (names::DATASET_QUALITY.to_string(), 0.10),
            (names::CODE_QUALITY.to_string(), 0.15),
            (names::REPRODUCIBILITY.to_string(), 0.10),
            (names::REVIEWEDNESS.to_string(), 0.10),
            (names::TREE_SCORE.to_string(), 0.05),
        ]))
    }
}

impl Weights {
    pub fn get(&self, metric: &str) -> f64 { self.0.get(metric).copied().unwrap_or(0.0) }

    pub fn total(&self) -> f64 { self.0.values().sum() }
}

/// Business reason an artifact was turned away. Not a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DisqualificationReason {
    LicenseGate { metric: String },
    BelowThreshold { net_score: f64, threshold: f64 },
}

impl std::fmt::Display for DisqualificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LicenseGate { metric } => write!(f, "gating metric {metric} scored 0"),
            Self::BelowThreshold { net_score, threshold } => write!(f, "net score {net_score:.3} below threshold {threshold:.3}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Disqualified(DisqualificationReason),
    /// No gate could be evaluated; the run cannot be decided.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// `None` when any metric errored.
    pub net_score: Option<f64>,
    pub verdict: Verdict,
    pub latency_secs: f64,
}

#[derive(Debug, Clone)]
pub struct Aggregator { weights: Weights, threshold: f64 }

impl Aggregator {
    pub fn new(weights: Weights, threshold: f64) -> Self { Self { weights, threshold } }

    /// Pure function of the result set; input order does not matter.
    pub fn aggregate(&self, results: &[MetricResult]) -> Aggregation {
        let start = Instant::now();
        let mut sorted: Vec<&MetricResult> = results.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let gates: Vec<&MetricResult> = sorted.iter().copied().filter(|r| r.role == MetricRole::Gate).collect();
        if let Some(failed) = gates.iter().find(|r| r.score() == Some(0.0)) {
            let verdict = Verdict::Disqualified(DisqualificationReason::LicenseGate { metric: failed.name.clone() });
            return Aggregation { net_score: self.net(&sorted), verdict, latency_secs: start.elapsed().as_secs_f64() };
        }
        if !gates.is_empty() && gates.iter().all(|r| r.is_errored()) {
            return Aggregation { net_score: None, verdict: Verdict::Indeterminate, latency_secs: start.elapsed().as_secs_f64() };
        }
        let net_score = self.net(&sorted);
        let verdict = match net_score {
            None => Verdict::Accepted,
            Some(net) if net < self.threshold => Verdict::Disqualified(DisqualificationReason::BelowThreshold { net_score: net, threshold: self.threshold }),
            Some(_) => Verdict::Accepted,
        };
        Aggregation { net_score, verdict, latency_secs: start.elapsed().as_secs_f64() }
    }

    // expects name-sorted input so float summation order is fixed
    fn net(&self, sorted: &[&MetricResult]) -> Option<f64> {
        let mut sum = 0.0;
        for r in sorted {
            let score = r.score()?;
            if r.role == MetricRole::Weighted { sum += self.weights.get(&r.name) * score; }
        }
        Some(sum.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("evaluation incomplete: at least one metric errored")]
pub struct IncompleteEvaluation;

/// Published rating of an accepted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub artifact_id: ArtifactId,
    pub name: String,
    pub category: ArtifactType,
    net_score: Option<f64>,
    pub net_score_latency: f64,
    pub metrics: Vec<MetricResult>,
    pub size_score: SizeScores,
    pub size_score_latency: f64,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(artifact_id: ArtifactId, name: String, category: ArtifactType, aggregation: &Aggregation, metrics: Vec<MetricResult>, size: (SizeScores, f64)) -> Self {
        Self {
            artifact_id,
            name,
            category,
            net_score: aggregation.net_score,
            net_score_latency: aggregation.latency_secs,
            metrics,
            size_score: size.0,
            size_score_latency: size.1,
            created_at: Utc::now(),
        }
    }

    pub fn net_score(&self) -> Result<f64, IncompleteEvaluation> { self.net_score.ok_or(IncompleteEvaluation) }

    pub fn is_complete(&self) -> bool { self.net_score.is_some() }

    pub fn metric(&self, name: &str) -> Option<&MetricResult> { self.metrics.iter().find(|m| m.name == name) }
}
