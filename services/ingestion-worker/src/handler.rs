use std::time::Duration;

use registry_core::{
    ArtifactId, ArtifactType, DisqualificationReason, EvaluationPipeline, FetchError, LicenseCheckError, LicenseSubject, PipelineError, PipelineState,
    RegistrationOutcome, RegistrationRequest, RepositoryError, UsageContext, WaitError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode { #[default] Sync, Deferred }

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Register {
        #[serde(rename = "type")]
        artifact_type: ArtifactType,
        source_url: String,
        #[serde(default)]
        mode: Mode,
        #[serde(default)]
        actor: Option<String>,
    },
    Status { artifact_id: ArtifactId },
    /// Blocks until a deferred run finishes; the pipeline's poll interval drives the checks.
    Wait { artifact_id: ArtifactId, #[serde(default)] timeout_secs: Option<f64> },
    Rating { artifact_id: ArtifactId },
    Cost { artifact_id: ArtifactId, #[serde(default)] include_dependencies: bool },
    Lineage { artifact_id: ArtifactId },
    License {
        #[serde(default)]
        identifier: Option<String>,
        #[serde(default)]
        github_url: Option<String>,
        usage: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind { Disqualified, IncompleteEvaluation, NotFound, BadRequest, Upstream, Internal }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self { Self { kind, message: message.into(), detail: None } }

    fn with_detail(mut self, detail: Value) -> Self { self.detail = Some(detail); self }

    fn disqualified(artifact_id: ArtifactId, reason: &DisqualificationReason) -> Self {
        Self::new(ErrorKind::Disqualified, reason.to_string()).with_detail(json!({ "artifact_id": artifact_id, "reason": reason }))
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let kind = match &e {
            PipelineError::Fetch(FetchError::UnsupportedSource(_)) => ErrorKind::BadRequest,
            PipelineError::Fetch(FetchError::NotFound(_)) => ErrorKind::NotFound,
            PipelineError::Fetch(_) => ErrorKind::Upstream,
            PipelineError::Incomplete(_) => ErrorKind::IncompleteEvaluation,
            PipelineError::NotRated(_) | PipelineError::Repository(RepositoryError::NotFound(_)) => ErrorKind::NotFound,
            PipelineError::Indeterminate | PipelineError::Repository(_) | PipelineError::Graph(_) => ErrorKind::Internal,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<LicenseCheckError> for ApiError {
    fn from(e: LicenseCheckError) -> Self {
        let kind = match &e {
            LicenseCheckError::InvalidUsage(_) | LicenseCheckError::MissingSubject => ErrorKind::BadRequest,
            LicenseCheckError::ProjectNotFound(_) => ErrorKind::NotFound,
            LicenseCheckError::Upstream(_) => ErrorKind::Upstream,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<WaitError> for ApiError {
    fn from(e: WaitError) -> Self {
        let kind = match e { WaitError::Unknown(_) => ErrorKind::NotFound, WaitError::TimedOut(_) => ErrorKind::Upstream };
        Self::new(kind, e.to_string())
    }
}

/// One line of output: `{"ok":true,"result":..}` or `{"ok":false,"error":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl From<Result<Value, ApiError>> for Response {
    fn from(r: Result<Value, ApiError>) -> Self {
        match r {
            Ok(result) => Self { ok: true, result: Some(result), error: None },
            Err(error) => Self { ok: false, result: None, error: Some(error) },
        }
    }
}

fn to_value(v: impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(v).map_err(|e| ApiError::new(ErrorKind::Internal, e.to_string()))
}

fn outcome_value(outcome: RegistrationOutcome) -> Result<Value, ApiError> {
    match outcome {
        RegistrationOutcome::Accepted(rating) => Ok(json!({ "artifact_id": rating.artifact_id, "status": "accepted", "rating": to_value(&rating)? })),
        RegistrationOutcome::Rejected { artifact_id, reason } => Err(ApiError::disqualified(artifact_id, &reason)),
        RegistrationOutcome::Failed { artifact_id, error } => Err(ApiError::from(error).with_detail(json!({ "artifact_id": artifact_id }))),
    }
}

fn state_value(artifact_id: ArtifactId, state: &PipelineState) -> Value {
    let mut v = json!({ "artifact_id": artifact_id, "status": state.label() });
    match state {
        PipelineState::Accepted(r) => v["net_score"] = json!(r.net_score().ok()),
        PipelineState::Rejected(reason) => v["reason"] = json!(reason.to_string()),
        PipelineState::Failed(e) => v["error"] = json!(e.to_string()),
        PipelineState::Pending | PipelineState::Evaluating => {}
    }
    v
}

#[derive(Clone)]
pub struct Handler { pipeline: EvaluationPipeline }

impl Handler {
    pub fn new(pipeline: EvaluationPipeline) -> Self { Self { pipeline } }

    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(req) => self.handle(req).await.into(),
            Err(e) => {
                debug!(error = %e, "malformed request line");
                Response::from(Err(ApiError::new(ErrorKind::BadRequest, format!("malformed request: {e}"))))
            }
        }
    }

    pub async fn handle(&self, req: Request) -> Result<Value, ApiError> {
        let p = &self.pipeline;
        match req {
            Request::Register { artifact_type, source_url, mode, actor } => {
                let mut request = RegistrationRequest::new(artifact_type, source_url);
                if let Some(actor) = actor { request = request.by(actor); }
                match mode {
                    Mode::Sync => outcome_value(p.register(request).await?),
                    Mode::Deferred => {
                        let ack = p.submit(request).await?;
                        Ok(json!({ "artifact_id": ack.artifact_id, "status": "pending" }))
                    }
                }
            }
            Request::Status { artifact_id } => p.status(artifact_id)
                .map(|s| state_value(artifact_id, &s))
                .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("no pipeline run known for {artifact_id}"))),
            Request::Wait { artifact_id, timeout_secs } => {
                let cfg = p.config();
                let timeout = match timeout_secs {
                    Some(s) => Duration::try_from_secs_f64(s)
                        .map_err(|e| ApiError::new(ErrorKind::BadRequest, format!("timeout_secs {s}: {e}")))?,
                    None => cfg.deadline() * 2,
                };
                outcome_value(p.wait_for_outcome(artifact_id, cfg.poll_interval(), timeout).await?)
            }
            Request::Rating { artifact_id } => {
                let rating = p.get_rating(artifact_id).await?;
                if rating.is_complete() { return to_value(&rating); }
                warn!(%artifact_id, "rating requested for incomplete evaluation");
                Err(ApiError::from(PipelineError::Incomplete(registry_core::IncompleteEvaluation)).with_detail(to_value(&rating)?))
            }
            Request::Cost { artifact_id, include_dependencies } => to_value(p.get_cost(artifact_id, include_dependencies).await?),
            Request::Lineage { artifact_id } => to_value(p.get_lineage(artifact_id).await?),
            Request::License { identifier, github_url, usage } => {
                let usage: UsageContext = usage.parse()?;
                let subject = match (identifier.filter(|s| !s.trim().is_empty()), github_url.filter(|s| !s.trim().is_empty())) {
                    (Some(id), _) => LicenseSubject::Identifier(id),
                    (None, Some(url)) => LicenseSubject::Project(url),
                    (None, None) => return Err(LicenseCheckError::MissingSubject.into()),
                };
                let compatible = p.check_license(subject, usage).await?;
                Ok(json!({ "compatible": compatible, "usage": usage }))
            }
        }
    }
}
