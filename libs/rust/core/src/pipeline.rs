//! Registration pipeline: fetch, evaluate, aggregate, persist.
//!
//! State machine per artifact: `pending -> evaluating -> {accepted, rejected, failed}`.
//! One deadline covers the metadata fetch and the evaluator fan-out. Evaluators
//! still running at the deadline are aborted and their results dropped.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{Aggregator, DisqualificationReason, IncompleteEvaluation, Rating, Verdict};
use crate::artifact::{Artifact, ArtifactId, ArtifactStatus, ArtifactType, NewArtifact};
use crate::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::config::{ConfigError, PipelineConfig};
use crate::cost::{CostMap, CostResolver, GraphComputationError};
use crate::license::{check_compatibility, normalize_license, LicenseCheckError, LicenseResolver, LicenseSubject, NoProjectResolver, UsageContext};
use crate::lineage::{LineageGraph, LineageGraphBuilder, LineageNode, NodeId};
use crate::metadata::{FetchError, MetadataFetcher};
use crate::metrics::{default_evaluators, evaluate_guarded, EvaluationContext, EvaluatorError, MetricEvaluator, MetricResult};
use crate::repository::{Repository, RepositoryError};
use crate::size_score::SizeSuitabilityEvaluator;
use crate::telemetry;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("metadata fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no gating metric could be evaluated")]
    Indeterminate,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Graph(#[from] GraphComputationError),
    #[error(transparent)]
    Incomplete(#[from] IncompleteEvaluation),
    #[error("artifact {0} has no rating")]
    NotRated(ArtifactId),
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub artifact_type: ArtifactType,
    pub source_url: String,
    pub actor: String,
}

impl RegistrationRequest {
    pub fn new(artifact_type: ArtifactType, source_url: impl Into<String>) -> Self {
        Self { artifact_type, source_url: source_url.into(), actor: "anonymous".into() }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self { self.actor = actor.into(); self }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Accepted(Rating),
    Rejected { artifact_id: ArtifactId, reason: DisqualificationReason },
    Failed { artifact_id: ArtifactId, error: PipelineError },
}

impl RegistrationOutcome {
    pub fn artifact_id(&self) -> ArtifactId {
        match self {
            Self::Accepted(r) => r.artifact_id,
            Self::Rejected { artifact_id, .. } | Self::Failed { artifact_id, .. } => *artifact_id,
        }
    }
}

/// Job-table view of one run. Terminal states carry the outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Pending,
    Evaluating,
    Accepted(Rating),
    Rejected(DisqualificationReason),
    Failed(PipelineError),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Pending | Self::Evaluating) }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Evaluating => "evaluating",
            Self::Accepted(_) => "accepted",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }

    /// Repository status a finished run left behind. Failed runs are committed as rejected.
    fn committed_status(&self) -> Option<ArtifactStatus> {
        match self {
            Self::Accepted(_) => Some(ArtifactStatus::Accepted),
            Self::Rejected(_) | Self::Failed(_) => Some(ArtifactStatus::Rejected),
            Self::Pending | Self::Evaluating => None,
        }
    }

    fn into_outcome(self, artifact_id: ArtifactId) -> Option<RegistrationOutcome> {
        match self {
            Self::Accepted(r) => Some(RegistrationOutcome::Accepted(r)),
            Self::Rejected(reason) => Some(RegistrationOutcome::Rejected { artifact_id, reason }),
            Self::Failed(error) => Some(RegistrationOutcome::Failed { artifact_id, error }),
            Self::Pending | Self::Evaluating => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement { pub artifact_id: ArtifactId }

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaitError {
    #[error("no pipeline run known for {0}")]
    Unknown(ArtifactId),
    #[error("artifact {0} did not reach a terminal state in time")]
    TimedOut(ArtifactId),
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    fetcher: Arc<dyn MetadataFetcher>,
    repository: Arc<dyn Repository>,
    evaluators: Vec<Arc<dyn MetricEvaluator>>,
    audit: Arc<dyn AuditSink>,
    license_resolver: Arc<dyn LicenseResolver>,
}

impl PipelineBuilder {
    /// Replaces the built-in evaluator set.
    pub fn evaluators(mut self, evaluators: Vec<Arc<dyn MetricEvaluator>>) -> Self { self.evaluators = evaluators; self }

    /// Adds one evaluator to the current set.
    pub fn register_evaluator(mut self, evaluator: Arc<dyn MetricEvaluator>) -> Self { self.evaluators.push(evaluator); self }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self { self.audit = sink; self }

    pub fn license_resolver(mut self, resolver: Arc<dyn LicenseResolver>) -> Self { self.license_resolver = resolver; self }

    pub fn build(self) -> Result<EvaluationPipeline, ConfigError> {
        self.config.validate()?;
        let aggregator = Aggregator::new(self.config.weights.clone(), self.config.acceptance_threshold);
        let sizes = SizeSuitabilityEvaluator::new(self.config.platform_capacities_mb);
        Ok(EvaluationPipeline {
            inner: Arc::new(Inner {
                jobs: RwLock::new(JobTable::new(self.config.max_tracked_jobs)),
                config: self.config,
                fetcher: self.fetcher,
                repository: self.repository,
                evaluators: self.evaluators,
                audit: self.audit,
                license_resolver: self.license_resolver,
                aggregator,
                sizes,
            }),
        })
    }
}

struct Inner {
    config: PipelineConfig,
    fetcher: Arc<dyn MetadataFetcher>,
    repository: Arc<dyn Repository>,
    evaluators: Vec<Arc<dyn MetricEvaluator>>,
    audit: Arc<dyn AuditSink>,
    license_resolver: Arc<dyn LicenseResolver>,
    aggregator: Aggregator,
    sizes: SizeSuitabilityEvaluator,
    jobs: RwLock<JobTable>,
}

/// Run state per artifact. Only finished runs count against `capacity` and
/// they are evicted oldest first; pending and evaluating runs always stay.
struct JobTable {
    states: HashMap<ArtifactId, PipelineState>,
    finished: VecDeque<ArtifactId>,
    capacity: usize,
}

impl JobTable {
    fn new(capacity: usize) -> Self { Self { states: HashMap::new(), finished: VecDeque::new(), capacity } }

    fn get(&self, id: &ArtifactId) -> Option<&PipelineState> { self.states.get(id) }

    fn set(&mut self, id: ArtifactId, state: PipelineState) {
        let newly_finished = state.is_terminal() && !self.states.get(&id).is_some_and(PipelineState::is_terminal);
        self.states.insert(id, state);
        if !newly_finished { return; }
        self.finished.push_back(id);
        while self.finished.len() > self.capacity {
            if let Some(old) = self.finished.pop_front() {
                self.states.remove(&old);
            }
        }
    }
}

/// Cheap to clone; clones share collaborators and the job table.
#[derive(Clone)]
pub struct EvaluationPipeline { inner: Arc<Inner> }

impl EvaluationPipeline {
    pub fn builder(config: PipelineConfig, fetcher: Arc<dyn MetadataFetcher>, repository: Arc<dyn Repository>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            fetcher,
            repository,
            evaluators: default_evaluators(),
            audit: Arc::new(TracingAuditSink),
            license_resolver: Arc::new(NoProjectResolver),
        }
    }

    pub fn config(&self) -> &PipelineConfig { &self.inner.config }

    /// Blocking mode: returns once the run reaches a terminal state.
    pub async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome, PipelineError> {
        let artifact = self.create(&request).await?;
        self.run(artifact, &request.actor).await
    }

    /// Deferred mode: creates the artifact, spawns the run and returns at once.
    pub async fn submit(&self, request: RegistrationRequest) -> Result<Acknowledgement, PipelineError> {
        let artifact = self.create(&request).await?;
        let artifact_id = artifact.id;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(artifact, &request.actor).await {
                warn!(artifact_id = %artifact_id, error = %e, "deferred run did not commit");
            }
        });
        Ok(Acknowledgement { artifact_id })
    }

    /// Runs the pipeline for an artifact that already exists and is still pending.
    pub async fn evaluate_pending(&self, artifact_id: ArtifactId, actor: &str) -> Result<RegistrationOutcome, PipelineError> {
        let artifact = self.inner.repository.get_artifact(artifact_id).await?;
        if artifact.status.is_terminal() {
            return Err(RepositoryError::Conflict { id: artifact_id, current: artifact.status }.into());
        }
        self.run(artifact, actor).await
    }

    /// Current job state. Finished runs may be evicted once the table is full.
    pub fn status(&self, artifact_id: ArtifactId) -> Option<PipelineState> { self.inner.jobs.read().get(&artifact_id).cloned() }

    /// Polls [`status`](Self::status) every `poll_interval` until a terminal state or `timeout`.
    /// A timeout too large to represent waits without a deadline.
    pub async fn wait_for_outcome(&self, artifact_id: ArtifactId, poll_interval: Duration, timeout: Duration) -> Result<RegistrationOutcome, WaitError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        loop {
            let ticked = match deadline {
                Some(deadline) => timeout_at(deadline, ticker.tick()).await.is_ok(),
                None => { ticker.tick().await; true }
            };
            if !ticked { return Err(WaitError::TimedOut(artifact_id)); }
            match self.status(artifact_id) {
                None => return Err(WaitError::Unknown(artifact_id)),
                Some(state) => {
                    if let Some(outcome) = state.into_outcome(artifact_id) { return Ok(outcome); }
                }
            }
        }
    }

    /// The persisted rating; its net score may still be incomplete.
    pub async fn get_rating(&self, artifact_id: ArtifactId) -> Result<Rating, PipelineError> {
        self.inner.repository.get_rating(artifact_id).await?.ok_or(PipelineError::NotRated(artifact_id))
    }

    pub async fn get_net_score(&self, artifact_id: ArtifactId) -> Result<f64, PipelineError> {
        Ok(self.get_rating(artifact_id).await?.net_score()?)
    }

    /// Persisted lineage, or the lone artifact node when none was stored.
    pub async fn get_lineage(&self, artifact_id: ArtifactId) -> Result<LineageGraph, PipelineError> {
        let artifact = self.inner.repository.get_artifact(artifact_id).await?;
        let stored = self.inner.repository.get_lineage(artifact_id).await?;
        Ok(stored.unwrap_or_else(|| LineageGraph { nodes: vec![artifact_node(&artifact)], edges: Vec::new() }))
    }

    #[instrument(skip(self))]
    pub async fn get_cost(&self, artifact_id: ArtifactId, include_dependencies: bool) -> Result<CostMap, PipelineError> {
        let artifact = self.inner.repository.get_artifact(artifact_id).await?;
        let mut graph = self.get_lineage(artifact_id).await?;
        let root = NodeId::new(artifact_id.to_string());
        if let Some(node) = graph.nodes.iter_mut().find(|n| n.id == root) {
            if node.size_mb.is_none() { node.size_mb = artifact.size_mb; }
        }
        CostResolver::new().resolve(&graph, &root, include_dependencies).map_err(|e| {
            warn!(error = %e, "cost query failed");
            PipelineError::Graph(e)
        })
    }

    /// License compatibility for a bare identifier or for an external project.
    pub async fn check_license(&self, subject: LicenseSubject, usage: UsageContext) -> Result<bool, LicenseCheckError> {
        let identifier = match subject {
            LicenseSubject::Identifier(id) => id,
            LicenseSubject::Project(url) => self.inner.license_resolver.resolve(&url).await?,
        };
        let compatible = check_compatibility(&identifier, usage);
        debug!(license = %normalize_license(&identifier), ?usage, compatible, "license checked");
        self.inner.audit.record(AuditEvent::now(AuditAction::LicenseCheck, None, "license-check"));
        Ok(compatible)
    }

    async fn create(&self, request: &RegistrationRequest) -> Result<Artifact, PipelineError> {
        let artifact = self.inner.repository
            .create_artifact(NewArtifact::new(request.artifact_type, request.source_url.clone()))
            .await
            .map_err(|e| { error!(error = %e, "artifact creation failed"); e })?;
        self.set_state(artifact.id, PipelineState::Pending);
        self.inner.audit.record(AuditEvent::now(AuditAction::Create, Some(artifact.id), &request.actor));
        info!(artifact_id = %artifact.id, artifact_type = %artifact.artifact_type, source_url = %artifact.source_url, "artifact registered");
        Ok(artifact)
    }

    fn set_state(&self, id: ArtifactId, state: PipelineState) { self.inner.jobs.write().set(id, state); }

    /// Moves the job to `Evaluating` under one write lock, refusing a run that already finished.
    fn begin_run(&self, id: ArtifactId) -> Result<(), PipelineError> {
        let mut jobs = self.inner.jobs.write();
        if let Some(current) = jobs.get(&id).and_then(PipelineState::committed_status) {
            return Err(RepositoryError::Conflict { id, current }.into());
        }
        jobs.set(id, PipelineState::Evaluating);
        Ok(())
    }

    /// Writes a terminal status. A lost race is returned untouched; any other
    /// storage error still finishes the job as failed so pollers see it.
    async fn commit_status(&self, id: ArtifactId, status: ArtifactStatus, started: Instant) -> Result<(), PipelineError> {
        match self.inner.repository.put_artifact_status(id, status).await {
            Ok(()) => Ok(()),
            Err(e @ RepositoryError::Conflict { .. }) => {
                warn!(error = %e, "terminal status already committed by another run");
                Err(e.into())
            }
            Err(e) => {
                error!(error = %e, ?status, "committing terminal status failed");
                let error = PipelineError::Repository(e);
                self.set_state(id, PipelineState::Failed(error.clone()));
                telemetry::record_outcome("failed", started.elapsed().as_secs_f64() * 1000.0);
                Err(error)
            }
        }
    }

    #[instrument(skip(self, artifact, actor), fields(artifact_id = %artifact.id, artifact_type = %artifact.artifact_type))]
    async fn run(&self, artifact: Artifact, actor: &str) -> Result<RegistrationOutcome, PipelineError> {
        let started = Instant::now();
        let deadline = started + self.inner.config.deadline();
        self.begin_run(artifact.id)?;

        let fetched = match timeout_at(deadline, self.inner.fetcher.fetch(&artifact.source_url, artifact.artifact_type)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout),
        };
        let bundle = match fetched {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "metadata fetch failed");
                return self.fail(&artifact, actor, PipelineError::Fetch(e), started).await;
            }
        };
        if let Err(e) = self.inner.repository.put_artifact_details(artifact.id, bundle.name.clone(), bundle.size_mb).await {
            error!(error = %e, "storing artifact details failed");
            return self.fail(&artifact, actor, e.into(), started).await;
        }

        let root = NodeId::new(artifact.id.to_string());
        let lineage = LineageGraphBuilder::new().build(&root, &bundle);
        let size_mb = bundle.size_mb.unwrap_or(self.inner.config.fallback_size_mb);
        let ctx = EvaluationContext { root, metadata: Arc::new(bundle), lineage: Arc::new(lineage) };

        let results = self.evaluate_all(&ctx, deadline).await;
        let aggregation = self.inner.aggregator.aggregate(&results);
        debug!(net_score = ?aggregation.net_score, verdict = ?aggregation.verdict, "aggregated");

        match aggregation.verdict.clone() {
            Verdict::Indeterminate => self.fail(&artifact, actor, PipelineError::Indeterminate, started).await,
            Verdict::Disqualified(reason) => {
                self.commit_status(artifact.id, ArtifactStatus::Rejected, started).await?;
                info!(reason = %reason, "artifact disqualified");
                self.inner.audit.record(AuditEvent::now(AuditAction::Reject, Some(artifact.id), actor));
                self.set_state(artifact.id, PipelineState::Rejected(reason.clone()));
                telemetry::record_outcome("rejected", started.elapsed().as_secs_f64() * 1000.0);
                Ok(RegistrationOutcome::Rejected { artifact_id: artifact.id, reason })
            }
            Verdict::Accepted => {
                let sizes = self.inner.sizes.score_timed(size_mb);
                let name = ctx.metadata.name.clone();
                let rating = Rating::new(artifact.id, name, artifact.artifact_type, &aggregation, results, sizes);
                // rating and lineage are staged; the accepted status is the commit point
                if let Err(e) = self.persist(&artifact, &rating, &ctx.lineage).await {
                    error!(error = %e, "persisting rating failed");
                    return self.fail(&artifact, actor, e, started).await;
                }
                self.commit_status(artifact.id, ArtifactStatus::Accepted, started).await?;
                info!(net_score = ?rating.net_score().ok(), complete = rating.is_complete(), "artifact accepted");
                self.inner.audit.record(AuditEvent::now(AuditAction::Rate, Some(artifact.id), actor));
                self.set_state(artifact.id, PipelineState::Accepted(rating.clone()));
                telemetry::record_outcome("accepted", started.elapsed().as_secs_f64() * 1000.0);
                Ok(RegistrationOutcome::Accepted(rating))
            }
        }
    }

    async fn persist(&self, artifact: &Artifact, rating: &Rating, lineage: &LineageGraph) -> Result<(), PipelineError> {
        self.inner.repository.put_rating(artifact.id, rating.clone()).await?;
        self.inner.repository.put_lineage(artifact.id, lineage.clone()).await?;
        Ok(())
    }

    // failed runs are committed as rejected so they are never servable
    async fn fail(&self, artifact: &Artifact, actor: &str, error: PipelineError, started: Instant) -> Result<RegistrationOutcome, PipelineError> {
        self.commit_status(artifact.id, ArtifactStatus::Rejected, started).await?;
        warn!(error = %error, "pipeline run failed");
        self.inner.audit.record(AuditEvent::now(AuditAction::Fail, Some(artifact.id), actor));
        self.set_state(artifact.id, PipelineState::Failed(error.clone()));
        telemetry::record_outcome("failed", started.elapsed().as_secs_f64() * 1000.0);
        Ok(RegistrationOutcome::Failed { artifact_id: artifact.id, error })
    }

    /// Fans the evaluators out and collects results in registration order.
    /// Evaluators without a result at the deadline are reported as errored.
    /// Permits are scoped to the run so late work never starves the next one.
    async fn evaluate_all(&self, ctx: &EvaluationContext, deadline: Instant) -> Vec<MetricResult> {
        let evaluators = &self.inner.evaluators;
        let mut slots: Vec<Option<MetricResult>> = vec![None; evaluators.len()];
        let permits = Arc::new(Semaphore::new(self.inner.config.max_concurrent_evaluators));
        let mut set = JoinSet::new();
        for (idx, evaluator) in evaluators.iter().enumerate() {
            let (evaluator, ctx, permits) = (Arc::clone(evaluator), ctx.clone(), Arc::clone(&permits));
            set.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (idx, MetricResult::errored(evaluator.name(), evaluator.role(), &EvaluatorError::Failed("worker pool closed".into()), 0.0)),
                };
                (idx, evaluate_guarded(evaluator.as_ref(), &ctx).await)
            });
        }

        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, result)))) => {
                    telemetry::record_metric(&result.name, result.latency_secs * 1000.0, result.is_errored());
                    slots[idx] = Some(result);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "evaluator task did not complete"),
                Ok(None) => break,
                Err(_) => {
                    let late = set.len();
                    warn!(outstanding = late, "evaluation deadline elapsed");
                    telemetry::record_late(late as u64);
                    set.abort_all();
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(evaluators)
            .map(|(slot, ev)| slot.unwrap_or_else(|| MetricResult::errored(ev.name(), ev.role(), &EvaluatorError::DeadlineElapsed, 0.0)))
            .collect()
    }
}

fn artifact_node(artifact: &Artifact) -> LineageNode {
    LineageNode {
        id: NodeId::new(artifact.id.to_string()),
        name: artifact.name.clone(),
        source: "registry".into(),
        size_mb: artifact.size_mb,
        metadata: serde_json::json!({ "source_url": artifact.source_url }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBundle;
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;

    struct Static(MetadataBundle);

    #[async_trait]
    impl MetadataFetcher for Static {
        async fn fetch(&self, _url: &str, _t: ArtifactType) -> Result<MetadataBundle, FetchError> { Ok(self.0.clone()) }
    }

    fn pipeline(bundle: MetadataBundle) -> EvaluationPipeline {
        EvaluationPipeline::builder(PipelineConfig::default(), Arc::new(Static(bundle)), Arc::new(InMemoryRepository::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unlicensed_artifact_is_rejected_and_not_rated() {
        let bundle = MetadataBundle::new("acme/m", "https://huggingface.co/acme/m", ArtifactType::Model);
        let p = pipeline(bundle);
        let out = p.register(RegistrationRequest::new(ArtifactType::Model, "https://huggingface.co/acme/m")).await.unwrap();
        let id = out.artifact_id();
        assert!(matches!(out, RegistrationOutcome::Rejected { reason: DisqualificationReason::LicenseGate { .. }, .. }));
        assert_eq!(p.status(id).map(|s| s.label()), Some("rejected"));
        assert_eq!(p.get_rating(id).await.unwrap_err(), PipelineError::NotRated(id));
    }

    #[tokio::test]
    async fn lineage_of_rejected_artifact_is_the_lone_node() {
        let mut bundle = MetadataBundle::new("acme/m", "https://huggingface.co/acme/m", ArtifactType::Model);
        bundle.size_mb = Some(3.0);
        let p = pipeline(bundle);
        let id = p.register(RegistrationRequest::new(ArtifactType::Model, "https://huggingface.co/acme/m")).await.unwrap().artifact_id();
        let g = p.get_lineage(id).await.unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert!(g.edges.is_empty());
        let costs = p.get_cost(id, true).await.unwrap();
        assert_eq!(costs[&NodeId::new(id.to_string())].total_cost, 3.0);
    }

    #[test]
    fn job_table_never_evicts_unfinished_runs() {
        let mut jobs = JobTable::new(1);
        let (running, old, new) = (ArtifactId::generate(), ArtifactId::generate(), ArtifactId::generate());
        jobs.set(running, PipelineState::Evaluating);
        jobs.set(old, PipelineState::Failed(PipelineError::Indeterminate));
        jobs.set(old, PipelineState::Failed(PipelineError::Indeterminate));
        jobs.set(new, PipelineState::Failed(PipelineError::Indeterminate));
        assert_eq!(jobs.get(&running), Some(&PipelineState::Evaluating));
        assert_eq!(jobs.get(&old), None);
        assert!(jobs.get(&new).is_some());
        assert_eq!(jobs.finished.len(), 1);
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let mut cfg = PipelineConfig::default();
        cfg.evaluation_deadline_secs = 0.0;
        let bundle = MetadataBundle::new("x", "u", ArtifactType::Code);
        let built = EvaluationPipeline::builder(cfg, Arc::new(Static(bundle)), Arc::new(InMemoryRepository::new())).build();
        assert!(built.is_err());
    }

    #[tokio::test]
    async fn identifier_license_check_uses_matrix() {
        let p = pipeline(MetadataBundle::new("x", "u", ArtifactType::Code));
        assert!(p.check_license(LicenseSubject::Identifier("MIT License".into()), UsageContext::FineTuning).await.unwrap());
        assert!(!p.check_license(LicenseSubject::Identifier("gpl-3.0".into()), UsageContext::FineTuning).await.unwrap());
        let err = p.check_license(LicenseSubject::Project("https://github.com/a/b".into()), UsageContext::Inference).await.unwrap_err();
        assert!(matches!(err, LicenseCheckError::Upstream(_)));
    }
}
