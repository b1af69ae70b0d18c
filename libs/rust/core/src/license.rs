//! License compatibility matrix (license family x usage context).
//!
//! Conservative by construction: unknown identifiers are incompatible. A
//! project whose license cannot be resolved at all is an upstream failure
//! and is reported as an error, never as `false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageContext { FineTuning, Inference }

impl FromStr for UsageContext {
    type Err = LicenseCheckError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fine-tuning" | "finetuning" | "fine-tune" => Ok(Self::FineTuning),
            "inference" => Ok(Self::Inference),
            other => Err(LicenseCheckError::InvalidUsage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseFamily {
    Permissive,
    WeakCopyleft,
    StrongCopyleft,
    NetworkCopyleft,
    ResponsibleAi,
    NonCommercial,
    Proprietary,
}

impl LicenseFamily {
    pub fn allows(&self, usage: UsageContext) -> bool {
        use LicenseFamily::*;
        use UsageContext::*;
        match (self, usage) {
            (Permissive | WeakCopyleft | ResponsibleAi, _) => true,
            (StrongCopyleft | NonCommercial, Inference) => true,
            (StrongCopyleft | NonCommercial, FineTuning) => false,
            (NetworkCopyleft | Proprietary, _) => false,
        }
    }
}

const PERMISSIVE: &[&str] = &["mit", "bsd-2-clause", "bsd-3-clause", "apache-2.0", "isc", "unlicense", "cc0-1.0", "cc-by-4.0", "bsl-1.0", "zlib", "wtfpl"];
const WEAK_COPYLEFT: &[&str] = &["lgpl-2.1", "lgpl-3.0", "mpl-2.0", "epl-2.0", "cc-by-sa-4.0"];
const STRONG_COPYLEFT: &[&str] = &["gpl-2.0", "gpl-2.0-only", "gpl-2.0-or-later", "gpl-3.0", "gpl-3.0-only", "gpl-3.0-or-later"];
const NETWORK_COPYLEFT: &[&str] = &["agpl-3.0", "agpl-3.0-only", "agpl-3.0-or-later"];
const RESPONSIBLE_AI: &[&str] = &["openrail", "openrail++", "creativeml-openrail-m", "bigscience-openrail-m", "bigscience-bloom-rail-1.0", "llama2", "llama3", "llama3.1", "llama3.2", "gemma"];
const NON_COMMERCIAL: &[&str] = &["cc-by-nc-4.0", "cc-by-nc-sa-4.0", "cc-by-nc-nd-4.0", "cc-by-nc-2.0", "cc-by-nc-3.0"];
const PROPRIETARY: &[&str] = &["proprietary", "custom", "other", "unknown"];

/// Maps common spellings onto SPDX-like lowercase identifiers; anything not
/// recognised is returned trimmed and lowercased.
pub fn normalize_license(raw: &str) -> String {
    let value = raw.trim().to_lowercase();
    let mapped = match value.as_str() {
        "mit license" | "the mit license" | "expat" => "mit",
        "apache2" | "apache 2.0" | "apache-2" | "apache license 2.0" | "apache license, version 2.0" | "apache" => "apache-2.0",
        "bsd 3-clause" | "bsd-3" | "bsd 3-clause \"new\" or \"revised\" license" | "new bsd" => "bsd-3-clause",
        "bsd 2-clause" | "bsd-2" | "simplified bsd" => "bsd-2-clause",
        "gplv3" | "gpl v3" | "gnu gpl v3" => "gpl-3.0",
        "gplv2" | "gpl v2" => "gpl-2.0",
        "lgplv3" => "lgpl-3.0",
        "lgplv2.1" => "lgpl-2.1",
        "agplv3" => "agpl-3.0",
        "cc0" => "cc0-1.0",
        "the unlicense" => "unlicense",
        other => other,
    };
    mapped.to_string()
}

pub fn license_family(identifier: &str) -> Option<LicenseFamily> {
    let id = normalize_license(identifier);
    let table: [(&[&str], LicenseFamily); 7] = [
        (PERMISSIVE, LicenseFamily::Permissive),
        (WEAK_COPYLEFT, LicenseFamily::WeakCopyleft),
        (STRONG_COPYLEFT, LicenseFamily::StrongCopyleft),
        (NETWORK_COPYLEFT, LicenseFamily::NetworkCopyleft),
        (RESPONSIBLE_AI, LicenseFamily::ResponsibleAi),
        (NON_COMMERCIAL, LicenseFamily::NonCommercial),
        (PROPRIETARY, LicenseFamily::Proprietary),
    ];
    table.iter().find(|(ids, _)| ids.contains(&id.as_str())).map(|(_, fam)| *fam)
}

/// `true` when `identifier` may be used in `usage`. Unknown ids are `false`.
pub fn check_compatibility(identifier: &str, usage: UsageContext) -> bool {
    license_family(identifier).map(|f| f.allows(usage)).unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LicenseCheckError {
    #[error("invalid usage context {0:?}")]
    InvalidUsage(String),
    #[error("project {0} could not be found")]
    ProjectNotFound(String),
    #[error("license information unavailable: {0}")]
    Upstream(String),
    #[error("a license identifier or a project url is required")]
    MissingSubject,
}

/// What a license check is asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseSubject {
    Identifier(String),
    /// External project whose license must be looked up first.
    Project(String),
}

/// Resolves the license identifier of an external project (e.g. a GitHub repo).
#[async_trait]
pub trait LicenseResolver: Send + Sync {
    async fn resolve(&self, project_url: &str) -> Result<String, LicenseCheckError>;
}

/// Resolver used when no external host is wired in; every project is unresolvable.
#[derive(Debug, Default, Clone)]
pub struct NoProjectResolver;

#[async_trait]
impl LicenseResolver for NoProjectResolver {
    async fn resolve(&self, project_url: &str) -> Result<String, LicenseCheckError> {
        Err(LicenseCheckError::Upstream(format!("no license resolver configured for {project_url}")))
    }
}
