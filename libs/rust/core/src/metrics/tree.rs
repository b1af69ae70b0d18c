use async_trait::async_trait;

use super::{names, EvaluationContext, EvaluatorError, MetricEvaluator};
use crate::lineage::LineageNode;

/// Structural completeness of the dependency subtree below the artifact.
///
/// Fraction of reachable dependencies that exist in the node set with a name
/// and a usable size, halved when the subtree contains a cycle.
pub struct TreeScore;

fn is_complete(node: Option<&LineageNode>) -> bool {
    match node {
        Some(n) => !n.name.trim().is_empty() && n.size_mb.is_some_and(|s| s.is_finite() && s >= 0.0),
        None => false,
    }
}

#[async_trait]
impl MetricEvaluator for TreeScore {
    fn name(&self) -> &str { names::TREE_SCORE }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let graph = &ctx.lineage;
        let reach = graph.reachable_from(&ctx.root);
        let deps: Vec<_> = reach.visited.iter().filter(|id| **id != ctx.root).collect();
        if deps.is_empty() {
            return Ok(if reach.cycle { 0.5 } else { 1.0 });
        }
        let complete = deps.iter().filter(|id| is_complete(graph.node(id))).count();
        let ratio = complete as f64 / deps.len() as f64;
        Ok(if reach.cycle { ratio / 2.0 } else { ratio })
    }
}
