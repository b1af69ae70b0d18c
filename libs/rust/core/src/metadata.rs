//! Metadata snapshot consumed by the evaluators and the lineage builder.
//!
//! A bundle is fetched once per evaluation run and shared read-only between
//! every evaluator task; nothing here is persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataBundle {
    pub name: String,
    pub source_url: String,
    pub artifact_type: ArtifactType,
    #[serde(default)]
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    /// Raw contents of a dependency manifest (requirements.txt, environment.yml, ...).
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub code_url: Option<String>,
    #[serde(default)]
    pub dataset_urls: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<DeclaredDependency>,
    #[serde(default)]
    pub activity: ActivitySignals,
}

impl MetadataBundle {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            artifact_type,
            size_mb: None,
            license: None,
            readme: None,
            description: None,
            files: Vec::new(),
            tags: Vec::new(),
            downloads: 0,
            likes: 0,
            requirements: None,
            code_url: None,
            dataset_urls: Vec::new(),
            dependencies: Vec::new(),
            activity: ActivitySignals::default(),
        }
    }

    /// README and description joined and lowercased, for keyword heuristics.
    pub fn documentation_text(&self) -> String {
        let mut text = String::new();
        if let Some(d) = &self.description { text.push_str(d); text.push('\n'); }
        if let Some(r) = &self.readme { text.push_str(r); }
        text.to_lowercase()
    }

    pub fn has_file(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.files.iter().any(|f| pred(&f.to_ascii_lowercase()))
    }
}

/// A reference to another artifact or external package found in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    /// Identifier of the referenced node (repo id, package name or artifact id).
    pub reference: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Relationship label as found in metadata, e.g. `fine-tuned-from`.
    pub relationship: String,
    /// Declaring node; `None` means the artifact under evaluation.
    #[serde(default)]
    pub declared_by: Option<String>,
    #[serde(default)]
    pub size_mb: Option<f64>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_source() -> String { "config_json".to_string() }

impl DeclaredDependency {
    pub fn new(reference: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self { reference: reference.into(), name: None, relationship: relationship.into(), declared_by: None, size_mb: None, source: default_source(), metadata: serde_json::Value::Null }
    }

    pub fn with_size(mut self, size_mb: f64) -> Self { self.size_mb = Some(size_mb); self }

    pub fn declared_by(mut self, node: impl Into<String>) -> Self { self.declared_by = Some(node.into()); self }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitySignals {
    #[serde(default)]
    pub contributors: u32,
    #[serde(default)]
    pub last_commit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub open_issues: u32,
    /// `None` when the source host exposes no pull-request history.
    #[serde(default)]
    pub pull_requests: Option<PullRequestStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStats { pub total: u32, pub reviewed: u32 }

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("unsupported source url {0}")]
    UnsupportedSource(String),
    #[error("source {0} not found")]
    NotFound(String),
    #[error("metadata fetch timed out")]
    Timeout,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// Source-host adapter producing a [`MetadataBundle`] for a URL.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, source_url: &str, artifact_type: ArtifactType) -> Result<MetadataBundle, FetchError>;
}
