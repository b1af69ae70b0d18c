//! Audit trail emitted by the pipeline. Fire-and-forget: sinks never fail the run.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::artifact::ArtifactId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction { Create, Rate, Reject, Fail, LicenseCheck }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub artifact_id: Option<ArtifactId>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn now(action: AuditAction, artifact_id: Option<ArtifactId>, actor: &str) -> Self {
        Self { action, artifact_id, actor: actor.to_string(), timestamp: Utc::now() }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes each event as a structured `info` log line under the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let id = event.artifact_id.map(|i| i.to_string()).unwrap_or_default();
        info!(target: "audit", action = ?event.action, artifact_id = %id, actor = %event.actor, timestamp = %event.timestamp, "audit");
    }
}

/// Keeps events in memory, for tests and inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditSink { events: Arc<Mutex<Vec<AuditEvent>>> }

impl RecordingAuditSink {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<AuditEvent> { self.events.lock().clone() }

    pub fn actions_for(&self, id: ArtifactId) -> Vec<AuditAction> {
        self.events.lock().iter().filter(|e| e.artifact_id == Some(id)).map(|e| e.action).collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) { self.events.lock().push(event); }
}
