use async_trait::async_trait;

use super::{names, EvaluationContext, EvaluatorError, MetricEvaluator, MetricRole};
use crate::license::{license_family, UsageContext};

/// License gate. 1.0 when usable for fine-tuning and inference, 0.5 for
/// inference only, 0.0 otherwise (absent and unknown licenses included).
pub struct LicenseMetric;

#[async_trait]
impl MetricEvaluator for LicenseMetric {
    fn name(&self) -> &str { names::LICENSE }

    fn role(&self) -> MetricRole { MetricRole::Gate }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let Some(family) = ctx.metadata.license.as_deref().and_then(license_family) else { return Ok(0.0) };
        Ok(match (family.allows(UsageContext::FineTuning), family.allows(UsageContext::Inference)) {
            (true, true) => 1.0,
            (false, true) => 0.5,
            _ => 0.0,
        })
    }
}
