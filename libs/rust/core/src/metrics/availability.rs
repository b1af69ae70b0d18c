//! Availability and quality of the data and code behind an artifact.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::documentation::is_dependency_manifest;
use super::{names, EvaluationContext, EvaluatorError, KeywordSet, MetricEvaluator};
use crate::metadata::MetadataBundle;

static DATASET_WORDS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&[
    "trained on", "training data", "dataset", "corpus", "fine-tuned on", "pretrained on",
]));

fn references_dataset(m: &MetadataBundle) -> bool {
    !m.dataset_urls.is_empty()
        || m.dependencies.iter().any(|d| d.relationship.eq_ignore_ascii_case("trained-on"))
        || DATASET_WORDS.distinct_hits(&m.documentation_text()) > 0
}

fn links_code(m: &MetadataBundle) -> bool {
    m.code_url.as_deref().map(|u| !u.trim().is_empty()).unwrap_or(false)
}

/// 0.5 for a referenced training dataset, 0.5 for a linked code repository.
pub struct DatasetAndCodeScore;

#[async_trait]
impl MetricEvaluator for DatasetAndCodeScore {
    fn name(&self) -> &str { names::DATASET_AND_CODE_SCORE }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        let mut score = 0.0;
        if references_dataset(m) { score += 0.5; }
        if links_code(m) { score += 0.5; }
        Ok(score)
    }
}

/// Usage, documentation depth and licensing of the data.
pub struct DatasetQuality;

impl DatasetQuality {
    fn usage_tier(m: &MetadataBundle) -> f64 {
        let base: f64 = match m.downloads {
            d if d >= 1_000_000 => 1.0,
            d if d >= 100_000 => 0.8,
            d if d >= 10_000 => 0.6,
            d if d >= 1_000 => 0.4,
            d if d > 0 => 0.2,
            _ => 0.0,
        };
        let bump = if m.likes >= 100 { 0.2 } else if m.likes >= 10 { 0.1 } else { 0.0 };
        (base + bump).min(1.0)
    }

    fn documentation_depth(m: &MetadataBundle) -> f64 {
        let desc = m.description.as_deref().map(str::trim).unwrap_or("");
        let readme = m.readme.as_deref().map(str::trim).unwrap_or("");
        let mut score: f64 = 0.0;
        if desc.len() > 20 { score += 0.4; }
        if readme.len() > 200 { score += 0.4; } else if !readme.is_empty() { score += 0.2; }
        if readme.lines().filter(|l| l.trim_start().starts_with('#')).count() >= 3 { score += 0.2; }
        score.min(1.0)
    }
}

#[async_trait]
impl MetricEvaluator for DatasetQuality {
    fn name(&self) -> &str { names::DATASET_QUALITY }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        let license = if m.license.as_deref().map(|l| !l.trim().is_empty()).unwrap_or(false) { 1.0 } else { 0.0 };
        Ok((0.5 * Self::usage_tier(m) + 0.3 * Self::documentation_depth(m) + 0.2 * license).clamp(0.0, 1.0))
    }
}

/// Structural hygiene visible in the repository file list.
pub struct CodeQuality;

// (share, predicate over a lowercased path)
const CODE_SIGNALS: &[(f64, fn(&str) -> bool)] = &[
    (0.25, |f| f.starts_with("tests/") || f.starts_with("test/") || f.contains("/tests/") || f.rsplit('/').next().is_some_and(|b| b.starts_with("test_") || b.ends_with("_test.py"))),
    (0.15, |f| f.starts_with(".github/workflows/") || f == ".gitlab-ci.yml" || f == ".travis.yml" || f.starts_with(".circleci/")),
    (0.15, |f| matches!(f, ".flake8" | "ruff.toml" | ".ruff.toml" | ".pylintrc" | "mypy.ini" | ".pre-commit-config.yaml" | "tox.ini" | ".editorconfig" | "rustfmt.toml")),
    (0.20, is_dependency_manifest),
    (0.15, |f| f.rsplit('/').next().is_some_and(|b| b.starts_with("readme"))),
    (0.10, |f| matches!(f, "setup.py" | "setup.cfg" | "pyproject.toml" | "cargo.toml" | "package.json" | "manifest.in")),
];

#[async_trait]
impl MetricEvaluator for CodeQuality {
    fn name(&self) -> &str { names::CODE_QUALITY }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        if m.files.is_empty() { return Err(EvaluatorError::MissingSignal("repository file list")); }
        let score: f64 = CODE_SIGNALS.iter().filter(|(_, hit)| m.has_file(hit)).map(|(share, _)| share).sum();
        Ok(score.min(1.0))
    }
}
