//! Metrics read off the README / model card.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{names, EvaluationContext, EvaluatorError, KeywordSet, MetricEvaluator};
use crate::metadata::MetadataBundle;

static DOC_SECTIONS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&[
    "usage", "example", "quickstart", "getting started", "installation", "setup", "requirements",
    "dependencies", "how to use", "inference", "prediction", "demo", "tutorial", "guide",
]));
static CODE_INDICATORS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&["```", "python", "import ", "from ", "def ", "class ", "if __name__"]));
static SETUP_INDICATORS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&["pip install", "conda install", "git clone", "download", "install", "setup"]));
static DESCRIPTION_WORDS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&["model", "architecture", "purpose", "task", "capability", "performance"]));

static PERF_KEYWORDS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&[
    "benchmark", "evaluation", "accuracy", "f1", "precision", "recall", "bleu", "rouge", "perplexity",
    "metric", "result", "comparison", "leaderboard", "sota", "state-of-the-art", "baseline",
]));
static BENCHMARK_DATASETS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&[
    "glue", "superglue", "squad", "ms marco", "wmt", "hellaswag", "mmlu", "humaneval", "gsm8k", "truthfulqa", "imagenet", "coco",
]));
static PAPER_INDICATORS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&["arxiv", "paper", "publication", "cite", "citation", "doi"]));
static PERF_SECTIONS: Lazy<KeywordSet> = Lazy::new(|| KeywordSet::new(&["## results", "## performance", "## evaluation", "## benchmark", "## metrics", "## experiments"]));

fn popularity_bonus(m: &MetadataBundle, high: f64, moderate: f64) -> f64 {
    let d = if m.downloads > 1_000_000 { high } else if m.downloads > 100_000 { moderate } else { 0.0 };
    let l = if m.likes > 1000 { high / 2.0 } else if m.likes > 100 { moderate / 2.0 } else { 0.0 };
    d + l
}

/// How quickly an engineer can understand, install and run the artifact.
pub struct RampUpTime;

impl RampUpTime {
    fn file_presence(m: &MetadataBundle) -> f64 {
        let mut score = 0.0;
        if m.readme.as_deref().map(|r| !r.trim().is_empty()).unwrap_or(false) { score += 0.3; }
        if m.has_file(|f| matches!(f.rsplit('/').next().unwrap_or(f), "readme.md" | "readme.txt" | "readme.rst")) { score += 0.1; }
        if m.has_file(is_dependency_manifest) || m.requirements.is_some() { score += 0.2; }
        if m.has_file(|f| {
            ["example", "inference", "demo", "sample", "quickstart", "tutorial"].iter().any(|k| f.contains(k))
                && (f.ends_with(".py") || f.ends_with(".ipynb") || f.ends_with(".md"))
        }) { score += 0.3; }
        if m.has_file(|f| {
            ["config", "tokenizer", "special_tokens_map", "vocab"].iter().any(|k| f.contains(k))
                && (f.ends_with(".json") || f.ends_with(".txt") || f.ends_with(".jsonl"))
        }) { score += 0.2; }
        f64::min(score, 1.0)
    }

    fn readme_quality(text: &str) -> f64 {
        if text.trim().is_empty() { return 0.0; }
        let sections = (DOC_SECTIONS.distinct_hits(text) as f64 * 0.1).min(0.4);
        let code = (CODE_INDICATORS.distinct_hits(text) as f64 * 0.05).min(0.3);
        let setup = (SETUP_INDICATORS.distinct_hits(text) as f64 * 0.05).min(0.2);
        let desc = (DESCRIPTION_WORDS.distinct_hits(text) as f64 * 0.02).min(0.1);
        (sections + code + setup + desc).min(1.0)
    }
}

#[async_trait]
impl MetricEvaluator for RampUpTime {
    fn name(&self) -> &str { names::RAMP_UP_TIME }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        let score = 0.6 * Self::file_presence(m) + 0.4 * Self::readme_quality(&m.documentation_text()) + popularity_bonus(m, 0.05, 0.02);
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Evidence backing the performance claims made in the card.
pub struct PerformanceClaims;

#[async_trait]
impl MetricEvaluator for PerformanceClaims {
    fn name(&self) -> &str { names::PERFORMANCE_CLAIMS }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        let text = m.documentation_text();
        let mut score = 0.0;
        if !text.trim().is_empty() {
            score += 0.1;
            score += (PERF_KEYWORDS.distinct_hits(&text) as f64 * 0.05).min(0.3);
            score += (BENCHMARK_DATASETS.distinct_hits(&text) as f64 * 0.08).min(0.2);
            score += (numeric_results(&text) as f64 * 0.03).min(0.15);
            score += (PAPER_INDICATORS.distinct_hits(&text) as f64 * 0.05).min(0.1);
            score += (PERF_SECTIONS.distinct_hits(&text) as f64 * 0.02).min(0.1);
        }
        let tag_hits = m.tags.iter().filter(|t| {
            let t = t.to_lowercase();
            ["benchmark", "evaluation", "metrics", "leaderboard", "sota", "baseline"].iter().any(|k| t.contains(k))
        }).count();
        score += (tag_hits as f64 * 0.05).min(0.1);
        score += popularity_bonus(m, 0.1, 0.05);
        Ok((2.0 * score).min(1.0))
    }
}

// numbers followed by %, or by a metric name, e.g. "92.1%" or "41.2 bleu"
fn numeric_results(text: &str) -> usize {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut hits = 0;
    for (i, tok) in tokens.iter().enumerate() {
        let t = tok.trim_matches(|c: char| matches!(c, '|' | '(' | ')' | ',' | ':'));
        if let Some(num) = t.strip_suffix('%') {
            if num.parse::<f64>().is_ok() { hits += 1; }
            continue;
        }
        if t.parse::<f64>().is_ok() {
            if let Some(next) = tokens.get(i + 1) {
                let next = next.trim_matches(|c: char| !c.is_alphanumeric());
                if matches!(next, "%" | "accuracy" | "f1" | "bleu" | "rouge" | "score" | "rank") { hits += 1; }
            }
        }
    }
    hits
}

/// Whether the documented demo can be reproduced from what is published.
///
/// 1.0 with runnable demo code and pinned dependencies, 0.5 with demo code
/// only, 0.0 otherwise.
pub struct Reproducibility;

impl Reproducibility {
    fn has_runnable_demo(readme: &str) -> bool {
        let mut in_block: Option<String> = None;
        for line in readme.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("```") {
                match in_block.take() {
                    Some(_) => {}
                    None => in_block = Some(rest.trim().to_ascii_lowercase()),
                }
                continue;
            }
            match in_block.as_deref() {
                Some("py") | Some("python") if !trimmed.is_empty() => return true,
                Some("bash") | Some("sh") | Some("shell") | Some("zsh") | Some("console") => {
                    let cmd = trimmed.trim_start_matches(['$', '>']).trim();
                    if cmd.starts_with("python ") || cmd.starts_with("python3 ") { return true; }
                }
                _ => {}
            }
        }
        false
    }

    fn pins_dependencies(requirements: &str) -> bool {
        let entries: Vec<&str> = requirements
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
            .collect();
        !entries.is_empty() && entries.iter().all(|l| l.contains("==") || l.contains('@'))
    }
}

#[async_trait]
impl MetricEvaluator for Reproducibility {
    fn name(&self) -> &str { names::REPRODUCIBILITY }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        let m = &ctx.metadata;
        let demo = m.readme.as_deref().map(Self::has_runnable_demo).unwrap_or(false);
        if !demo { return Ok(0.0); }
        let pinned = m.requirements.as_deref().map(Self::pins_dependencies).unwrap_or(false);
        Ok(if pinned { 1.0 } else { 0.5 })
    }
}

pub(super) fn is_dependency_manifest(f: &str) -> bool {
    let base = f.rsplit('/').next().unwrap_or(f);
    matches!(base, "requirements.txt" | "environment.yml" | "environment.yaml" | "pyproject.toml" | "setup.py" | "setup.cfg" | "cargo.toml" | "package.json")
}
