use async_trait::async_trait;
use registry_core::metrics::{names, LicenseMetric};
use registry_core::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WEIGHTED: [&str; 9] = [
    names::RAMP_UP_TIME, names::BUS_FACTOR, names::PERFORMANCE_CLAIMS, names::DATASET_AND_CODE_SCORE,
    names::DATASET_QUALITY, names::CODE_QUALITY, names::REPRODUCIBILITY, names::REVIEWEDNESS, names::TREE_SCORE,
];

struct StaticFetcher(MetadataBundle);

#[async_trait]
impl MetadataFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, _t: ArtifactType) -> Result<MetadataBundle, FetchError> { Ok(self.0.clone()) }
}

struct SlowFetcher(Duration);

#[async_trait]
impl MetadataFetcher for SlowFetcher {
    async fn fetch(&self, url: &str, t: ArtifactType) -> Result<MetadataBundle, FetchError> {
        tokio::time::sleep(self.0).await;
        Ok(MetadataBundle::new("slow", url, t))
    }
}

struct Fixed { name: &'static str, score: f64, delay: Duration }

#[async_trait]
impl MetricEvaluator for Fixed {
    fn name(&self) -> &str { self.name }
    async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        if !self.delay.is_zero() { tokio::time::sleep(self.delay).await; }
        Ok(self.score)
    }
}

struct Failing(&'static str, MetricRole);

#[async_trait]
impl MetricEvaluator for Failing {
    fn name(&self) -> &str { self.0 }
    fn role(&self) -> MetricRole { self.1 }
    async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<f64, EvaluatorError> { Err(EvaluatorError::Failed("upstream said no".into())) }
}

struct Panicking;

#[async_trait]
impl MetricEvaluator for Panicking {
    fn name(&self) -> &str { names::BUS_FACTOR }
    async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<f64, EvaluatorError> { panic!("evaluator bug") }
}

/// Sleeps through the first call only.
struct StallOnce { name: &'static str, stalled: AtomicBool }

#[async_trait]
impl MetricEvaluator for StallOnce {
    fn name(&self) -> &str { self.name }
    async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<f64, EvaluatorError> {
        if !self.stalled.swap(true, Ordering::SeqCst) { tokio::time::sleep(Duration::from_secs(5)).await; }
        Ok(0.9)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault { Rating, Status }

/// In-memory repository whose chosen write always fails.
struct Faulty { inner: InMemoryRepository, fault: Fault }

impl Faulty {
    fn check(&self, at: Fault) -> Result<(), RepositoryError> {
        if self.fault == at { Err(RepositoryError::Storage("disk full".into())) } else { Ok(()) }
    }
}

#[async_trait]
impl Repository for Faulty {
    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, RepositoryError> { self.inner.create_artifact(new).await }
    async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact, RepositoryError> { self.inner.get_artifact(id).await }
    async fn put_artifact_details(&self, id: ArtifactId, name: String, size_mb: Option<f64>) -> Result<(), RepositoryError> {
        self.inner.put_artifact_details(id, name, size_mb).await
    }
    async fn put_artifact_status(&self, id: ArtifactId, status: ArtifactStatus) -> Result<(), RepositoryError> {
        self.check(Fault::Status)?;
        self.inner.put_artifact_status(id, status).await
    }
    async fn put_rating(&self, id: ArtifactId, rating: Rating) -> Result<(), RepositoryError> {
        self.check(Fault::Rating)?;
        self.inner.put_rating(id, rating).await
    }
    async fn get_rating(&self, id: ArtifactId) -> Result<Option<Rating>, RepositoryError> { self.inner.get_rating(id).await }
    async fn put_lineage(&self, id: ArtifactId, graph: LineageGraph) -> Result<(), RepositoryError> { self.inner.put_lineage(id, graph).await }
    async fn get_lineage(&self, id: ArtifactId) -> Result<Option<LineageGraph>, RepositoryError> { self.inner.get_lineage(id).await }
}

fn fixed(name: &'static str, score: f64) -> Arc<dyn MetricEvaluator> { Arc::new(Fixed { name, score, delay: Duration::ZERO }) }

/// Nine weighted evaluators at `score`, except those named in `replace`, plus the real license gate.
fn evaluators(score: f64, replace: Vec<Arc<dyn MetricEvaluator>>) -> Vec<Arc<dyn MetricEvaluator>> {
    let mut v: Vec<Arc<dyn MetricEvaluator>> = WEIGHTED
        .iter()
        .copied()
        .filter(|n| !replace.iter().any(|r| r.name() == *n))
        .map(|n| fixed(n, score))
        .collect();
    v.extend(replace);
    v.push(Arc::new(LicenseMetric));
    v
}

fn bundle(license: &str) -> MetadataBundle {
    let mut b = MetadataBundle::new("acme/a", "https://huggingface.co/acme/a", ArtifactType::Model);
    b.license = Some(license.into());
    b.size_mb = Some(2.0);
    b
}

fn config(deadline_secs: f64) -> PipelineConfig {
    PipelineConfig { evaluation_deadline_secs: deadline_secs, ..PipelineConfig::default() }
}

struct Harness { pipeline: EvaluationPipeline, repo: InMemoryRepository, audit: RecordingAuditSink }

fn harness(cfg: PipelineConfig, fetcher: Arc<dyn MetadataFetcher>, evs: Vec<Arc<dyn MetricEvaluator>>) -> Harness {
    let repo = InMemoryRepository::new();
    let audit = RecordingAuditSink::new();
    let pipeline = EvaluationPipeline::builder(cfg, fetcher, Arc::new(repo.clone()))
        .evaluators(evs)
        .audit_sink(Arc::new(audit.clone()))
        .build()
        .unwrap();
    Harness { pipeline, repo, audit }
}

fn faulty_harness(cfg: PipelineConfig, fetcher: Arc<dyn MetadataFetcher>, evs: Vec<Arc<dyn MetricEvaluator>>, fault: Fault) -> Harness {
    let repo = InMemoryRepository::new();
    let audit = RecordingAuditSink::new();
    let pipeline = EvaluationPipeline::builder(cfg, fetcher, Arc::new(Faulty { inner: repo.clone(), fault }))
        .evaluators(evs)
        .audit_sink(Arc::new(audit.clone()))
        .build()
        .unwrap();
    Harness { pipeline, repo, audit }
}

fn disk_full() -> PipelineError { PipelineError::Repository(RepositoryError::Storage("disk full".into())) }

fn request() -> RegistrationRequest { RegistrationRequest::new(ArtifactType::Model, "https://huggingface.co/acme/a").by("alice") }

#[tokio::test]
async fn accepted_with_weighted_net_score() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]));
    let out = h.pipeline.register(request()).await.unwrap();
    let RegistrationOutcome::Accepted(rating) = out else { panic!("expected acceptance, got {out:?}") };
    assert!((rating.net_score().unwrap() - 0.8).abs() < 1e-9);
    assert_eq!(rating.metric(names::LICENSE).and_then(|m| m.score()), Some(1.0));
    assert_eq!(rating.metrics.len(), 10);
    assert_eq!(rating.size_score.edge_device, 1.0);

    let id = rating.artifact_id;
    assert_eq!(h.repo.get_artifact(id).await.unwrap().status, ArtifactStatus::Accepted);
    assert_eq!(h.pipeline.get_rating(id).await.unwrap(), rating);
    assert_eq!(h.pipeline.status(id).map(|s| s.label()), Some("accepted"));
    assert_eq!(h.audit.actions_for(id), vec![AuditAction::Create, AuditAction::Rate]);
    assert!(h.audit.events().iter().all(|e| e.actor == "alice"));
}

#[tokio::test]
async fn identical_inputs_give_identical_scores() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("apache-2.0"))), evaluators(0.65, vec![]));
    let a = h.pipeline.register(request()).await.unwrap();
    let b = h.pipeline.register(request()).await.unwrap();
    match (a, b) {
        (RegistrationOutcome::Accepted(x), RegistrationOutcome::Accepted(y)) => assert_eq!(x.net_score(), y.net_score()),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn fetch_timeout_fails_without_rating() {
    let h = harness(config(0.2), Arc::new(SlowFetcher(Duration::from_secs(5))), evaluators(0.8, vec![]));
    let started = Instant::now();
    let out = h.pipeline.register(request()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    let RegistrationOutcome::Failed { artifact_id, error } = out else { panic!("expected failure, got {out:?}") };
    assert_eq!(error, PipelineError::Fetch(FetchError::Timeout));
    assert_eq!(h.repo.get_rating(artifact_id).await.unwrap(), None);
    assert_eq!(h.repo.get_artifact(artifact_id).await.unwrap().status, ArtifactStatus::Rejected);
    assert_eq!(h.pipeline.status(artifact_id).map(|s| s.label()), Some("failed"));
    assert_eq!(h.audit.actions_for(artifact_id), vec![AuditAction::Create, AuditAction::Fail]);
}

#[tokio::test]
async fn diamond_cost_counts_shared_dependency_once() {
    let mut b = bundle("mit");
    b.dependencies = vec![
        DeclaredDependency::new("acme/b", "fine-tuned-from").with_size(5.0),
        DeclaredDependency::new("acme/c", "trained-on").with_size(5.0),
        DeclaredDependency::new("acme/d", "fine-tuned-from").declared_by("acme/b").with_size(2.0),
        DeclaredDependency::new("acme/d", "fine-tuned-from").declared_by("acme/c"),
    ];
    let h = harness(config(5.0), Arc::new(StaticFetcher(b)), evaluators(0.9, vec![]));
    let id = h.pipeline.register(request()).await.unwrap().artifact_id();
    let root = NodeId::new(id.to_string());

    let costs = h.pipeline.get_cost(id, true).await.unwrap();
    assert_eq!(costs[&root].total_cost, 14.0);
    assert_eq!(costs[&root].standalone_cost, 2.0);
    assert_eq!(costs[&NodeId::from("acme/b")].total_cost, 7.0);
    assert_eq!(costs.len(), 4);

    let standalone = h.pipeline.get_cost(id, false).await.unwrap();
    assert_eq!(standalone.len(), 1);
    assert_eq!(standalone[&root], CostEntry { standalone_cost: 2.0, total_cost: 2.0 });

    let lineage = h.pipeline.get_lineage(id).await.unwrap();
    assert_eq!(lineage.nodes.len(), 4);
    assert_eq!(lineage.edges.len(), 4);
}

#[tokio::test]
async fn cost_fails_on_unresolvable_size() {
    let mut b = bundle("mit");
    b.dependencies = vec![DeclaredDependency::new("acme/unsized", "trained-on")];
    let h = harness(config(5.0), Arc::new(StaticFetcher(b)), evaluators(0.9, vec![]));
    let id = h.pipeline.register(request()).await.unwrap().artifact_id();
    let err = h.pipeline.get_cost(id, true).await.unwrap_err();
    assert_eq!(err, PipelineError::Graph(GraphComputationError::UnresolvedSize("acme/unsized".into())));
    assert!(h.pipeline.get_cost(id, false).await.is_ok());
}

#[tokio::test]
async fn license_gate_rejects_despite_perfect_scores() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("agpl-3.0"))), evaluators(1.0, vec![]));
    let out = h.pipeline.register(request()).await.unwrap();
    let id = out.artifact_id();
    assert_eq!(out, RegistrationOutcome::Rejected {
        artifact_id: id,
        reason: DisqualificationReason::LicenseGate { metric: names::LICENSE.into() },
    });
    assert_eq!(h.pipeline.get_rating(id).await.unwrap_err(), PipelineError::NotRated(id));
    assert_eq!(h.repo.get_artifact(id).await.unwrap().status, ArtifactStatus::Rejected);
    assert_eq!(h.audit.actions_for(id), vec![AuditAction::Create, AuditAction::Reject]);
}

#[tokio::test]
async fn below_threshold_is_disqualified() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.2, vec![]));
    let out = h.pipeline.register(request()).await.unwrap();
    assert!(matches!(out, RegistrationOutcome::Rejected { reason: DisqualificationReason::BelowThreshold { .. }, .. }));
}

#[tokio::test]
async fn errored_metric_gives_incomplete_rating() {
    let evs = evaluators(0.9, vec![Arc::new(Failing(names::REVIEWEDNESS, MetricRole::Weighted))]);
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evs);
    let id = h.pipeline.register(request()).await.unwrap().artifact_id();

    assert_eq!(h.pipeline.get_net_score(id).await, Err(PipelineError::Incomplete(IncompleteEvaluation)));
    let rating = h.pipeline.get_rating(id).await.unwrap();
    assert!(rating.metric(names::REVIEWEDNESS).unwrap().is_errored());
    assert_eq!(rating.metric(names::BUS_FACTOR).and_then(|m| m.score()), Some(0.9));
}

#[tokio::test]
async fn panicking_evaluator_is_contained() {
    let evs = evaluators(0.9, vec![Arc::new(Panicking)]);
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evs);
    let RegistrationOutcome::Accepted(rating) = h.pipeline.register(request()).await.unwrap() else { panic!("expected acceptance") };
    let bus = rating.metric(names::BUS_FACTOR).unwrap();
    assert_eq!(bus.outcome, MetricOutcome::Errored { error: "evaluator panicked: evaluator bug".into() });
}

#[tokio::test]
async fn deadline_drops_slow_evaluators() {
    let slow: Arc<dyn MetricEvaluator> = Arc::new(Fixed { name: names::CODE_QUALITY, score: 1.0, delay: Duration::from_secs(10) });
    let h = harness(config(0.3), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.9, vec![slow]));
    let started = Instant::now();
    let out = h.pipeline.register(request()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    let RegistrationOutcome::Accepted(rating) = out else { panic!("expected acceptance, got {out:?}") };
    assert_eq!(rating.net_score(), Err(IncompleteEvaluation));
    let code = rating.metric(names::CODE_QUALITY).unwrap();
    assert_eq!(code.outcome, MetricOutcome::Errored { error: EvaluatorError::DeadlineElapsed.to_string() });
}

#[tokio::test]
async fn unevaluable_gate_fails_the_run() {
    let mut evs: Vec<Arc<dyn MetricEvaluator>> = WEIGHTED.iter().map(|n| fixed(*n, 0.9)).collect();
    evs.push(Arc::new(Failing(names::LICENSE, MetricRole::Gate)));
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evs);
    let out = h.pipeline.register(request()).await.unwrap();
    let id = out.artifact_id();
    assert!(matches!(out, RegistrationOutcome::Failed { error: PipelineError::Indeterminate, .. }));
    assert_eq!(h.repo.get_rating(id).await.unwrap(), None);
}

#[tokio::test]
async fn deferred_submission_is_polled_to_completion() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]));
    let ack = h.pipeline.submit(request()).await.unwrap();
    let out = h.pipeline
        .wait_for_outcome(ack.artifact_id, Duration::from_millis(10), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(out, RegistrationOutcome::Accepted(_)));
    assert!(h.pipeline.status(ack.artifact_id).unwrap().is_terminal());
}

#[tokio::test]
async fn polling_reports_unknown_and_timeout() {
    let h = harness(config(30.0), Arc::new(SlowFetcher(Duration::from_secs(10))), evaluators(0.8, vec![]));
    let unknown = ArtifactId::generate();
    assert_eq!(
        h.pipeline.wait_for_outcome(unknown, Duration::from_millis(5), Duration::from_millis(50)).await,
        Err(WaitError::Unknown(unknown)),
    );
    let ack = h.pipeline.submit(request()).await.unwrap();
    assert_eq!(
        h.pipeline.wait_for_outcome(ack.artifact_id, Duration::from_millis(10), Duration::from_millis(80)).await,
        Err(WaitError::TimedOut(ack.artifact_id)),
    );
    assert_eq!(h.pipeline.status(ack.artifact_id).map(|s| s.label()), Some("evaluating"));
}

#[tokio::test]
async fn concurrent_runs_commit_at_most_once() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]));
    let artifact = h.repo.create_artifact(NewArtifact::new(ArtifactType::Model, "https://huggingface.co/acme/a")).await.unwrap();
    let (a, b) = tokio::join!(
        h.pipeline.evaluate_pending(artifact.id, "alice"),
        h.pipeline.evaluate_pending(artifact.id, "bob"),
    );
    let results = [a, b];
    let committed = results.iter().filter(|r| matches!(r, Ok(RegistrationOutcome::Accepted(_)))).count();
    let conflicts = results.iter().filter(|r| matches!(r, Err(PipelineError::Repository(RepositoryError::Conflict { .. })))).count();
    assert_eq!((committed, conflicts), (1, 1));
    assert_eq!(h.repo.get_artifact(artifact.id).await.unwrap().status, ArtifactStatus::Accepted);
    assert!(matches!(h.pipeline.evaluate_pending(artifact.id, "carol").await, Err(PipelineError::Repository(RepositoryError::Conflict { .. }))));
}

#[tokio::test]
async fn default_evaluators_run_end_to_end() {
    let mut b = bundle("apache-2.0");
    b.readme = Some("## Usage\n```python\nimport acme\n```\n## Results\naccuracy 92.0% on glue".into());
    b.files = vec!["README.md".into(), "requirements.txt".into(), "tests/test_a.py".into()];
    let repo = InMemoryRepository::new();
    let pipeline = EvaluationPipeline::builder(config(5.0), Arc::new(StaticFetcher(b)), Arc::new(repo)).build().unwrap();
    let out = pipeline.register(request()).await.unwrap();
    // reviewedness has no pull-request history, so either verdict carries every metric
    match out {
        RegistrationOutcome::Accepted(r) => assert_eq!(r.metrics.len(), 10),
        RegistrationOutcome::Rejected { .. } => {}
        RegistrationOutcome::Failed { error, .. } => panic!("run failed: {error}"),
    }
}

#[tokio::test]
async fn failed_rating_write_leaves_artifact_rejected() {
    let h = faulty_harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]), Fault::Rating);
    let out = h.pipeline.register(request()).await.unwrap();
    let id = out.artifact_id();
    assert_eq!(out, RegistrationOutcome::Failed { artifact_id: id, error: disk_full() });
    assert_eq!(h.repo.get_artifact(id).await.unwrap().status, ArtifactStatus::Rejected);
    assert_eq!(h.repo.get_rating(id).await.unwrap(), None);
    assert_eq!(h.pipeline.get_rating(id).await.unwrap_err(), PipelineError::NotRated(id));
    assert_eq!(h.pipeline.status(id).map(|s| s.label()), Some("failed"));
    assert_eq!(h.audit.actions_for(id), vec![AuditAction::Create, AuditAction::Fail]);
}

#[tokio::test]
async fn failed_accept_commit_is_observable_by_polling() {
    let h = faulty_harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]), Fault::Status);
    let ack = h.pipeline.submit(request()).await.unwrap();
    let id = ack.artifact_id;
    let out = h.pipeline.wait_for_outcome(id, Duration::from_millis(10), Duration::from_millis(500)).await.unwrap();
    assert_eq!(out, RegistrationOutcome::Failed { artifact_id: id, error: disk_full() });
    // the staged rating never became visible
    assert_eq!(h.repo.get_artifact(id).await.unwrap().status, ArtifactStatus::Pending);
    assert_eq!(h.repo.get_rating(id).await.unwrap(), None);

    // a finished job is not restarted even though the repository still says pending
    let again = h.pipeline.evaluate_pending(id, "bob").await.unwrap_err();
    assert_eq!(again, PipelineError::Repository(RepositoryError::Conflict { id, current: ArtifactStatus::Rejected }));
    assert_eq!(h.pipeline.status(id).map(|s| s.label()), Some("failed"));
}

#[tokio::test]
async fn failed_reject_commit_finishes_the_job() {
    let h = faulty_harness(config(5.0), Arc::new(StaticFetcher(bundle("agpl-3.0"))), evaluators(1.0, vec![]), Fault::Status);
    let err = h.pipeline.register(request()).await.unwrap_err();
    assert_eq!(err, disk_full());
    let id = h.audit.events()[0].artifact_id.unwrap();
    assert_eq!(h.pipeline.status(id), Some(PipelineState::Failed(disk_full())));
}

#[tokio::test]
async fn failed_fail_commit_finishes_the_job() {
    let h = faulty_harness(config(0.2), Arc::new(SlowFetcher(Duration::from_secs(5))), evaluators(0.8, vec![]), Fault::Status);
    let ack = h.pipeline.submit(request()).await.unwrap();
    let out = h.pipeline.wait_for_outcome(ack.artifact_id, Duration::from_millis(10), Duration::from_secs(3)).await.unwrap();
    assert_eq!(out, RegistrationOutcome::Failed { artifact_id: ack.artifact_id, error: disk_full() });
}

#[tokio::test]
async fn late_evaluators_do_not_starve_the_next_run() {
    let stall: Arc<dyn MetricEvaluator> = Arc::new(StallOnce { name: names::CODE_QUALITY, stalled: AtomicBool::new(false) });
    let cfg = PipelineConfig { max_concurrent_evaluators: 1, ..config(0.3) };
    let h = harness(cfg, Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.9, vec![stall]));

    let first = h.pipeline.register(request()).await.unwrap();
    assert!(h.pipeline.status(first.artifact_id()).unwrap().is_terminal());

    let started = Instant::now();
    let second = h.pipeline.register(request()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    let RegistrationOutcome::Accepted(rating) = second else { panic!("expected acceptance, got {second:?}") };
    assert!(rating.is_complete());
    assert_eq!(rating.metric(names::CODE_QUALITY).and_then(|m| m.score()), Some(0.9));
}

#[tokio::test]
async fn unbounded_wait_still_returns() {
    let h = harness(config(5.0), Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]));
    let ack = h.pipeline.submit(request()).await.unwrap();
    let out = h.pipeline.wait_for_outcome(ack.artifact_id, Duration::ZERO, Duration::MAX).await.unwrap();
    assert!(matches!(out, RegistrationOutcome::Accepted(_)));
}

#[tokio::test]
async fn job_table_keeps_only_recent_finished_runs() {
    let cfg = PipelineConfig { max_tracked_jobs: 2, ..config(5.0) };
    let h = harness(cfg, Arc::new(StaticFetcher(bundle("mit"))), evaluators(0.8, vec![]));
    let mut ids = Vec::new();
    for _ in 0..3 { ids.push(h.pipeline.register(request()).await.unwrap().artifact_id()); }
    assert_eq!(h.pipeline.status(ids[0]), None);
    assert!(h.pipeline.status(ids[1]).unwrap().is_terminal());
    assert!(h.pipeline.status(ids[2]).unwrap().is_terminal());
    // evicted jobs are still served from the repository
    assert!(h.pipeline.get_rating(ids[0]).await.is_ok());
}
