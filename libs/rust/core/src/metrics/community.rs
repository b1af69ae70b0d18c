use async_trait::async_trait;

use super::{names, EvaluationContext, EvaluatorError, MetricEvaluator};
use crate::artifact::ArtifactType;

const MAJOR_ORGS: &[&str] = &["google", "openai", "microsoft", "meta", "facebook", "anthropic", "nvidia", "tensorflow"];

fn is_major_organization(name: &str) -> bool {
    let owner = name.split('/').next().unwrap_or(name).to_ascii_lowercase();
    MAJOR_ORGS.iter().any(|org| owner.contains(org))
}

/// Knowledge concentration: how many people keep the artifact alive.
pub struct BusFactor;

impl BusFactor {
    fn tier(artifact_type: ArtifactType, contributors: u32) -> f64 {
        match (artifact_type, contributors) {
            (_, 0) => 0.0,
            (ArtifactType::Model, 1) => 0.3,
            (ArtifactType::Model, 2..=3) => 0.6,
            (ArtifactType::Model, _) => 1.0,
            (ArtifactType::Dataset, 1) => 0.4,
            (ArtifactType::Dataset, 2) => 0.7,
            (ArtifactType::Dataset, _) => 1.0,
            (ArtifactType::Code, 1) => 0.2,
            (ArtifactType::Code, 2..=3) => 0.4,
            (ArtifactType::Code, 4..=10) => 0.7,
            (ArtifactType::Code, _) => 1.0,
        }
    }
}

#[async_trait]
impl MetricEvaluator for BusFactor {
    fn name(&self) -> &str { names::BUS_FACTOR }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        if is_major_organization(&m.name) { return Ok(0.95); }
        Ok(Self::tier(m.artifact_type, m.activity.contributors))
    }
}

/// Share of merged changes that went through review.
pub struct Reviewedness;

#[async_trait]
impl MetricEvaluator for Reviewedness {
    fn name(&self) -> &str { names::REVIEWEDNESS }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let prs = ctx.metadata.activity.pull_requests.ok_or(EvaluatorError::MissingSignal("pull request history"))?;
        if prs.total == 0 { return Ok(0.0); }
        Ok((prs.reviewed.min(prs.total) as f64 / prs.total as f64).clamp(0.0, 1.0))
    }
}
