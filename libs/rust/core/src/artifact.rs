//! Registered artifacts and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s.trim()).map(Self) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType { Model, Dataset, Code }

#[derive(Debug, Error)]
#[error("unknown artifact type {0:?} (expected model, dataset or code)")]
pub struct UnknownArtifactType(pub String);

impl FromStr for ArtifactType {
    type Err = UnknownArtifactType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "model" => Ok(Self::Model),
            "dataset" => Ok(Self::Dataset),
            "code" => Ok(Self::Code),
            _ => Err(UnknownArtifactType(s.to_string())),
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Model => "model", Self::Dataset => "dataset", Self::Code => "code" })
    }
}

/// Persisted lifecycle. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus { Pending, Accepted, Rejected }

impl ArtifactStatus {
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Pending) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub name: String,
    pub artifact_type: ArtifactType,
    pub source_url: String,
    pub download_url: Option<String>,
    pub size_mb: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub status: ArtifactStatus,
}

/// Registration input handed to the repository.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub source_url: String,
}

impl NewArtifact {
    pub fn new(artifact_type: ArtifactType, source_url: impl Into<String>) -> Self {
        let source_url = source_url.into();
        Self { name: name_from_url(&source_url), artifact_type, source_url }
    }

    pub fn into_artifact(self) -> Artifact {
        Artifact {
            id: ArtifactId::generate(),
            name: self.name,
            artifact_type: self.artifact_type,
            source_url: self.source_url,
            download_url: None,
            size_mb: None,
            created_at: Utc::now(),
            status: ArtifactStatus::Pending,
        }
    }
}

/// Best-effort display name for a source URL.
///
/// Hugging Face URLs yield the `owner/name` repo id (`/datasets/` prefix
/// stripped), other hosts yield the first two path segments, and a bare host
/// yields the host itself.
pub fn name_from_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed.split_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
    let without_query = without_scheme.split(['?', '#']).next().unwrap_or(without_scheme);
    let mut parts = without_query.split('/').filter(|p| !p.is_empty());
    let host = match parts.next() { Some(h) => h, None => return trimmed.to_string() };
    let mut segments: Vec<&str> = parts.collect();
    if host.ends_with("huggingface.co") && matches!(segments.first(), Some(&"datasets") | Some(&"spaces")) {
        segments.remove(0);
    }
    let segments: Vec<&str> = segments
        .into_iter()
        .take_while(|s| !matches!(*s, "tree" | "blob" | "resolve"))
        .take(2)
        .map(|s| s.strip_suffix(".git").unwrap_or(s))
        .collect();
    if segments.is_empty() { host.to_string() } else { segments.join("/") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_from_hub_and_github_urls() {
        assert_eq!(name_from_url("https://huggingface.co/google-bert/bert-base-uncased"), "google-bert/bert-base-uncased");
        assert_eq!(name_from_url("https://huggingface.co/datasets/bookcorpus/bookcorpus"), "bookcorpus/bookcorpus");
        assert_eq!(name_from_url("https://huggingface.co/openai/whisper-tiny/tree/main"), "openai/whisper-tiny");
        assert_eq!(name_from_url("https://github.com/google-research/bert.git"), "google-research/bert");
        assert_eq!(name_from_url("https://example.org/"), "example.org");
    }

    #[test]
    fn artifact_type_parses_case_insensitively() {
        assert_eq!("Model".parse::<ArtifactType>().unwrap(), ArtifactType::Model);
        assert_eq!(" dataset ".parse::<ArtifactType>().unwrap(), ArtifactType::Dataset);
        assert!("weights".parse::<ArtifactType>().is_err());
    }

    #[test]
    fn new_artifacts_start_pending() {
        let a = NewArtifact::new(ArtifactType::Code, "https://github.com/psf/requests").into_artifact();
        assert_eq!(a.status, ArtifactStatus::Pending);
        assert_eq!(a.name, "psf/requests");
        assert!(!a.status.is_terminal());
    }
}
