//! Hugging Face and GitHub adapters behind [`MetadataFetcher`] and
//! [`LicenseResolver`].
//!
//! HTTP lives in [`HubFetcher`]; the JSON to [`MetadataBundle`] mapping is
//! kept in plain functions so it can be tested without a network.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registry_core::{
    ActivitySignals, ArtifactType, DeclaredDependency, FetchError, LicenseCheckError, LicenseResolver, MetadataBundle, MetadataFetcher, PullRequestStats,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::http::{HttpClient, HttpError};
use crate::settings::WorkerConfig;

const MB: f64 = 1024.0 * 1024.0;
/// Bytes per parameter assumed when only a safetensors parameter count is known (fp16).
const BYTES_PER_PARAM: f64 = 2.0;
const RAW_ACCEPT: &str = "application/vnd.github.raw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    HfModel(String),
    HfDataset(String),
    Github { owner: String, repo: String },
}

impl SourceRef {
    pub fn label(&self) -> String {
        match self {
            Self::HfModel(id) | Self::HfDataset(id) => id.clone(),
            Self::Github { owner, repo } => format!("{owner}/{repo}"),
        }
    }
}

/// Splits a source URL into host and path segments, dropping scheme, query and fragment.
fn host_and_segments(url: &str) -> Option<(String, Vec<&str>)> {
    let rest = url.trim().split_once("://").map(|(_, r)| r).unwrap_or(url.trim());
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let mut parts = rest.split('/');
    let host = parts.next()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    Some((host, parts.filter(|s| !s.is_empty()).collect()))
}

/// Hugging Face ids are `org/name` or a legacy bare `name`; path suffixes such
/// as `/tree/main` are ignored.
fn hf_id(segments: &[&str]) -> Option<String> {
    let stop = |s: &&str| matches!(*s, "tree" | "blob" | "resolve" | "raw" | "discussions" | "commits");
    let id: Vec<&str> = segments.iter().take_while(|s| !stop(*s)).take(2).copied().collect();
    (!id.is_empty()).then(|| id.join("/"))
}

pub fn classify(url: &str) -> Option<SourceRef> {
    let (host, segs) = host_and_segments(url)?;
    match host.as_str() {
        "huggingface.co" | "hf.co" => match segs.first() {
            Some(&"datasets") => hf_id(&segs[1..]).map(SourceRef::HfDataset),
            Some(&"spaces") | None => None,
            Some(_) => hf_id(&segs).map(SourceRef::HfModel),
        },
        "github.com" if segs.len() >= 2 => Some(SourceRef::Github {
            owner: segs[0].to_string(),
            repo: segs[1].trim_end_matches(".git").to_string(),
        }),
        _ => None,
    }
}

fn str_or_first(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(str_or_first),
        _ => None,
    }
}

fn str_list(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items.iter().filter_map(|i| i.as_str()).map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect(),
        _ => Vec::new(),
    }
}

fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|t| t.with_timezone(&Utc))
}

/// First `https://github.com/owner/repo` link in free text.
pub fn find_github_link(text: &str) -> Option<String> {
    text.match_indices("github.com/").find_map(|(i, _)| {
        let tail = &text[i + "github.com/".len()..];
        let end = tail.find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))).unwrap_or(tail.len());
        let mut parts = tail[..end].split('/').filter(|s| !s.is_empty());
        let (owner, repo) = (parts.next()?, parts.next()?.trim_end_matches(".git").trim_end_matches('.'));
        (!repo.is_empty()).then(|| format!("https://github.com/{owner}/{repo}"))
    })
}

/// Size in MB from a Hub payload: summed sibling blobs, then `usedStorage`,
/// then a parameter-count estimate.
pub fn hf_size_mb(json: &Value) -> Option<f64> {
    let blobs: f64 = json["siblings"].as_array().into_iter().flatten().filter_map(|s| s["size"].as_f64()).sum();
    if blobs > 0.0 { return Some(blobs / MB); }
    if let Some(bytes) = json["usedStorage"].as_f64().filter(|b| *b > 0.0) { return Some(bytes / MB); }
    json["safetensors"]["total"].as_f64().filter(|p| *p > 0.0).map(|p| p * BYTES_PER_PARAM / MB)
}

/// Maps a Hub model or dataset payload plus its README onto a bundle.
pub fn hf_bundle(source_url: &str, artifact_type: ArtifactType, id: &str, hf_base: &str, json: &Value, readme: Option<String>) -> MetadataBundle {
    let card = &json["cardData"];
    let tags = str_list(&json["tags"]);
    let mut m = MetadataBundle::new(id, source_url, artifact_type);
    m.license = str_or_first(&card["license"])
        .or_else(|| tags.iter().find_map(|t| t.strip_prefix("license:")).map(String::from));
    m.description = json["description"].as_str().or_else(|| card["description"].as_str()).map(String::from);
    m.files = json["siblings"].as_array().into_iter().flatten().filter_map(|s| s["rfilename"].as_str()).map(String::from).collect();
    m.downloads = json["downloads"].as_u64().unwrap_or(0);
    m.likes = json["likes"].as_u64().unwrap_or(0);
    m.size_mb = hf_size_mb(json);
    m.code_url = readme.as_deref().and_then(find_github_link);
    let datasets = str_list(&card["datasets"]);
    m.dataset_urls = datasets.iter().map(|d| format!("{}/datasets/{d}", hf_base.trim_end_matches('/'))).collect();
    m.dependencies = str_list(&card["base_model"]).into_iter().map(|b| DeclaredDependency::new(b, "fine-tuned-from"))
        .chain(datasets.into_iter().map(|d| DeclaredDependency::new(d, "trained-on")))
        .map(|mut d| { d.source = "model_card".into(); d })
        .collect();
    m.activity.last_commit = parse_time(&json["lastModified"]);
    m.tags = tags;
    m.readme = readme;
    m
}

/// Everything gathered for one GitHub repository.
#[derive(Debug, Clone, Default)]
pub struct GithubSnapshot {
    pub repo: Value,
    pub readme: Option<String>,
    pub files: Vec<String>,
    pub requirements: Option<String>,
    pub contributors: Option<u32>,
    pub pulls: Option<Value>,
}

/// Merged pull requests count toward the total. One counts as reviewed when an
/// outside author could not have merged it alone, or reviewers were requested.
pub fn pull_request_stats(pulls: &Value) -> Option<PullRequestStats> {
    let merged: Vec<&Value> = pulls.as_array()?.iter().filter(|p| !p["merged_at"].is_null()).collect();
    let reviewed = merged.iter().filter(|p| {
        let outside = matches!(p["author_association"].as_str(), Some("CONTRIBUTOR" | "FIRST_TIME_CONTRIBUTOR" | "FIRST_TIMER" | "NONE"));
        let requested = p["requested_reviewers"].as_array().map(|r| !r.is_empty()).unwrap_or(false)
            || p["requested_teams"].as_array().map(|r| !r.is_empty()).unwrap_or(false);
        outside || requested
    }).count();
    Some(PullRequestStats { total: merged.len() as u32, reviewed: reviewed as u32 })
}

pub fn activity_from_github(repo: &Value, contributors: Option<u32>, pulls: Option<&Value>) -> ActivitySignals {
    ActivitySignals {
        contributors: contributors.unwrap_or(0),
        last_commit: parse_time(&repo["pushed_at"]),
        open_issues: repo["open_issues_count"].as_u64().unwrap_or(0) as u32,
        pull_requests: pulls.and_then(pull_request_stats),
    }
}

pub fn github_bundle(source_url: &str, artifact_type: ArtifactType, snap: GithubSnapshot) -> MetadataBundle {
    let repo = &snap.repo;
    let name = repo["full_name"].as_str().map(String::from).unwrap_or_else(|| registry_core::artifact::name_from_url(source_url));
    let mut m = MetadataBundle::new(name, source_url, artifact_type);
    m.license = repo["license"]["spdx_id"].as_str().filter(|s| *s != "NOASSERTION").map(String::from);
    m.description = repo["description"].as_str().map(String::from);
    m.size_mb = repo["size"].as_f64().map(|kb| kb / 1024.0);
    m.tags = str_list(&repo["topics"]);
    m.likes = repo["stargazers_count"].as_u64().unwrap_or(0);
    m.downloads = repo["forks_count"].as_u64().unwrap_or(0);
    m.code_url = Some(source_url.to_string());
    m.activity = activity_from_github(repo, snap.contributors, snap.pulls.as_ref());
    m.files = snap.files;
    m.requirements = snap.requirements;
    m.readme = snap.readme;
    m
}

/// Fetches bundles from the Hugging Face Hub and GitHub REST APIs.
#[derive(Clone)]
pub struct HubFetcher {
    http: HttpClient,
    hf_base: String,
    gh_base: String,
}

impl HubFetcher {
    pub fn new(http: HttpClient, cfg: &WorkerConfig) -> Self {
        Self { http, hf_base: cfg.hf_api_base.trim_end_matches('/').to_string(), gh_base: cfg.github_api_base.trim_end_matches('/').to_string() }
    }

    fn hf_paths(&self, src: &SourceRef) -> Option<(String, String)> {
        match src {
            SourceRef::HfModel(id) => Some((format!("{}/api/models/{id}?blobs=true", self.hf_base), format!("{}/{id}/raw/main", self.hf_base))),
            SourceRef::HfDataset(id) => Some((format!("{}/api/datasets/{id}?blobs=true", self.hf_base), format!("{}/datasets/{id}/raw/main", self.hf_base))),
            SourceRef::Github { .. } => None,
        }
    }

    /// Missing optional documents are `None`; only hard failures propagate.
    async fn optional_text(&self, url: &str, accept: &str) -> Option<String> {
        match self.http.text(url, accept).await {
            Ok(body) => body,
            Err(e) => { warn!(url, error = %e, "optional document unavailable"); None }
        }
    }

    async fn fetch_hf(&self, source_url: &str, artifact_type: ArtifactType, src: &SourceRef) -> Result<MetadataBundle, FetchError> {
        let Some((api, raw)) = self.hf_paths(src) else { return Err(FetchError::UnsupportedSource(source_url.to_string())) };
        let label = src.label();
        let json = self.http.json(&api).await.map_err(|e| e.into_fetch_error(&label))?;
        let readme = self.optional_text(&format!("{raw}/README.md"), "text/plain").await;
        let mut m = hf_bundle(source_url, artifact_type, &label, &self.hf_base, &json, readme);
        if let Some(req) = m.files.iter().find(|f| f.eq_ignore_ascii_case("requirements.txt")).cloned() {
            m.requirements = self.optional_text(&format!("{raw}/{req}"), "text/plain").await;
        }
        let code = m.code_url.as_deref().and_then(classify);
        if let Some(SourceRef::Github { owner, repo }) = code {
            self.fill_activity_from_code(&mut m, &owner, &repo).await;
        }
        self.size_dependencies(&mut m).await;
        Ok(m)
    }

    /// Hub repos expose no contributor or review history; the linked code repository stands in.
    async fn fill_activity_from_code(&self, m: &mut MetadataBundle, owner: &str, repo: &str) {
        let base = format!("{}/repos/{owner}/{repo}", self.gh_base);
        let repo_json = match self.http.json(&base).await {
            Ok(v) => v,
            Err(e) => { debug!(owner, repo, error = %e, "linked code repository unavailable"); return; }
        };
        let contributors = self.contributor_count(&base).await;
        let pulls = self.http.json(&format!("{base}/pulls?state=closed&per_page=100")).await.ok();
        let last_commit = m.activity.last_commit;
        m.activity = activity_from_github(&repo_json, contributors, pulls.as_ref());
        m.activity.last_commit = m.activity.last_commit.max(last_commit);
    }

    async fn contributor_count(&self, base: &str) -> Option<u32> {
        self.http.json(&format!("{base}/contributors?per_page=100&anon=1")).await.ok()
            .and_then(|v| v.as_array().map(|a| a.len() as u32))
    }

    /// One lookup per distinct Hub dependency; unresolved sizes stay `None`.
    async fn size_dependencies(&self, m: &mut MetadataBundle) {
        let refs: BTreeSet<(String, String)> = m.dependencies.iter().filter(|d| d.size_mb.is_none())
            .map(|d| (d.reference.trim().to_string(), d.relationship.clone())).collect();
        for (reference, relationship) in refs {
            let kind = if relationship == "trained-on" { "datasets" } else { "models" };
            let url = format!("{}/api/{kind}/{reference}?blobs=true", self.hf_base);
            match self.http.json(&url).await {
                Ok(json) => {
                    let size = hf_size_mb(&json);
                    for d in m.dependencies.iter_mut().filter(|d| d.reference.trim() == reference) {
                        d.size_mb = d.size_mb.or(size);
                        if d.name.is_none() { d.name = json["id"].as_str().map(String::from); }
                    }
                }
                Err(e) => debug!(reference, error = %e, "dependency size unresolved"),
            }
        }
    }

    async fn fetch_github(&self, source_url: &str, artifact_type: ArtifactType, owner: &str, repo: &str) -> Result<MetadataBundle, FetchError> {
        let label = format!("{owner}/{repo}");
        let base = format!("{}/repos/{owner}/{repo}", self.gh_base);
        let repo_json = self.http.json(&base).await.map_err(|e| e.into_fetch_error(&label))?;
        let branch = repo_json["default_branch"].as_str().unwrap_or("main").to_string();
        let files = match self.http.json(&format!("{base}/git/trees/{branch}?recursive=1")).await {
            Ok(tree) => tree["tree"].as_array().into_iter().flatten()
                .filter(|e| e["type"] == "blob")
                .filter_map(|e| e["path"].as_str()).map(String::from).collect(),
            Err(e) => { warn!(repo = %label, error = %e, "file tree unavailable"); Vec::new() }
        };
        let snap = GithubSnapshot {
            readme: self.optional_text(&format!("{base}/readme"), RAW_ACCEPT).await,
            requirements: if files.iter().any(|f| f == "requirements.txt") { self.optional_text(&format!("{base}/contents/requirements.txt"), RAW_ACCEPT).await } else { None },
            contributors: self.contributor_count(&base).await,
            pulls: self.http.json(&format!("{base}/pulls?state=closed&per_page=100")).await.ok(),
            files,
            repo: repo_json,
        };
        Ok(github_bundle(source_url, artifact_type, snap))
    }
}

#[async_trait]
impl MetadataFetcher for HubFetcher {
    #[instrument(skip(self), fields(source = %source_url))]
    async fn fetch(&self, source_url: &str, artifact_type: ArtifactType) -> Result<MetadataBundle, FetchError> {
        match classify(source_url) {
            Some(SourceRef::Github { owner, repo }) => self.fetch_github(source_url, artifact_type, &owner, &repo).await,
            Some(src) => self.fetch_hf(source_url, artifact_type, &src).await,
            None => Err(FetchError::UnsupportedSource(source_url.to_string())),
        }
    }
}

/// Looks up a GitHub project's SPDX id via `GET /repos/{owner}/{repo}/license`.
#[derive(Clone)]
pub struct GithubLicenseResolver {
    http: HttpClient,
    gh_base: String,
}

impl GithubLicenseResolver {
    pub fn new(http: HttpClient, cfg: &WorkerConfig) -> Self { Self { http, gh_base: cfg.github_api_base.trim_end_matches('/').to_string() } }
}

#[async_trait]
impl LicenseResolver for GithubLicenseResolver {
    async fn resolve(&self, project_url: &str) -> Result<String, LicenseCheckError> {
        let Some(SourceRef::Github { owner, repo }) = classify(project_url) else {
            return Err(LicenseCheckError::ProjectNotFound(project_url.to_string()));
        };
        match self.http.json(&format!("{}/repos/{owner}/{repo}/license", self.gh_base)).await {
            Ok(v) => v["license"]["spdx_id"].as_str().map(String::from)
                .ok_or_else(|| LicenseCheckError::Upstream(format!("{owner}/{repo} reports no license"))),
            Err(HttpError::Status(404)) => Err(LicenseCheckError::ProjectNotFound(project_url.to_string())),
            Err(e) => Err(LicenseCheckError::Upstream(e.to_string())),
        }
    }
}
