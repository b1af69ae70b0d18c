//! Persistence contract consumed by the pipeline, plus an in-memory implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::aggregate::Rating;
use crate::artifact::{Artifact, ArtifactId, ArtifactStatus, NewArtifact};
use crate::lineage::LineageGraph;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("artifact {0} not found")]
    NotFound(ArtifactId),
    /// A terminal status was already committed for this artifact.
    #[error("artifact {id} already committed as {current:?}")]
    Conflict { id: ArtifactId, current: ArtifactStatus },
    #[error("artifact {0} was rejected and cannot be rated")]
    NotAccepted(ArtifactId),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, RepositoryError>;
    async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact, RepositoryError>;
    async fn put_artifact_details(&self, id: ArtifactId, name: String, size_mb: Option<f64>) -> Result<(), RepositoryError>;
    /// Terminal statuses commit at most once; a second terminal write is a `Conflict`.
    async fn put_artifact_status(&self, id: ArtifactId, status: ArtifactStatus) -> Result<(), RepositoryError>;
    /// Stages a rating while the artifact is still pending. The accepted status
    /// committed afterwards is what makes it visible.
    async fn put_rating(&self, id: ArtifactId, rating: Rating) -> Result<(), RepositoryError>;
    /// `Some` only for accepted artifacts.
    async fn get_rating(&self, id: ArtifactId) -> Result<Option<Rating>, RepositoryError>;
    async fn put_lineage(&self, id: ArtifactId, graph: LineageGraph) -> Result<(), RepositoryError>;
    async fn get_lineage(&self, id: ArtifactId) -> Result<Option<LineageGraph>, RepositoryError>;
}

#[derive(Debug, Default)]
struct Tables {
    artifacts: HashMap<ArtifactId, Artifact>,
    ratings: HashMap<ArtifactId, Rating>,
    lineage: HashMap<ArtifactId, LineageGraph>,
}

/// Process-local repository; cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository { tables: Arc<RwLock<Tables>> }

impl InMemoryRepository {
    pub fn new() -> Self { Self::default() }

    pub fn artifact_count(&self) -> usize { self.tables.read().artifacts.len() }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, RepositoryError> {
        let artifact = new.into_artifact();
        self.tables.write().artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact, RepositoryError> {
        self.tables.read().artifacts.get(&id).cloned().ok_or(RepositoryError::NotFound(id))
    }

    async fn put_artifact_details(&self, id: ArtifactId, name: String, size_mb: Option<f64>) -> Result<(), RepositoryError> {
        let mut t = self.tables.write();
        let a = t.artifacts.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        a.name = name;
        if size_mb.is_some() { a.size_mb = size_mb; }
        Ok(())
    }

    async fn put_artifact_status(&self, id: ArtifactId, status: ArtifactStatus) -> Result<(), RepositoryError> {
        let mut t = self.tables.write();
        let a = t.artifacts.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if a.status.is_terminal() {
            return Err(RepositoryError::Conflict { id, current: a.status });
        }
        a.status = status;
        if status == ArtifactStatus::Rejected {
            // staged writes of a run that did not make it to accepted
            t.ratings.remove(&id);
            t.lineage.remove(&id);
        }
        Ok(())
    }

    async fn put_rating(&self, id: ArtifactId, rating: Rating) -> Result<(), RepositoryError> {
        let mut t = self.tables.write();
        match t.artifacts.get(&id).map(|a| a.status) {
            None => return Err(RepositoryError::NotFound(id)),
            Some(ArtifactStatus::Rejected) => return Err(RepositoryError::NotAccepted(id)),
            Some(ArtifactStatus::Accepted) => return Err(RepositoryError::Conflict { id, current: ArtifactStatus::Accepted }),
            Some(ArtifactStatus::Pending) => {}
        }
        t.ratings.insert(id, rating);
        Ok(())
    }

    async fn get_rating(&self, id: ArtifactId) -> Result<Option<Rating>, RepositoryError> {
        let t = self.tables.read();
        match t.artifacts.get(&id) {
            None => Err(RepositoryError::NotFound(id)),
            Some(a) if a.status == ArtifactStatus::Accepted => Ok(t.ratings.get(&id).cloned()),
            Some(_) => Ok(None),
        }
    }

    async fn put_lineage(&self, id: ArtifactId, graph: LineageGraph) -> Result<(), RepositoryError> {
        let mut t = self.tables.write();
        if !t.artifacts.contains_key(&id) { return Err(RepositoryError::NotFound(id)); }
        t.lineage.insert(id, graph);
        Ok(())
    }

    async fn get_lineage(&self, id: ArtifactId) -> Result<Option<LineageGraph>, RepositoryError> {
        let t = self.tables.read();
        if !t.artifacts.contains_key(&id) { return Err(RepositoryError::NotFound(id)); }
        Ok(t.lineage.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregation, Verdict};
    use crate::artifact::ArtifactType;
    use crate::size_score::SizeScores;

    fn new_model() -> NewArtifact { NewArtifact::new(ArtifactType::Model, "https://huggingface.co/acme/tiny") }

    fn rating(a: &Artifact) -> Rating {
        let agg = Aggregation { net_score: Some(0.7), verdict: Verdict::Accepted, latency_secs: 0.0 };
        Rating::new(a.id, a.name.clone(), a.artifact_type, &agg, vec![], (SizeScores::default(), 0.0))
    }

    #[tokio::test]
    async fn terminal_status_commits_once() {
        let repo = InMemoryRepository::new();
        let a = repo.create_artifact(new_model()).await.unwrap();
        assert_eq!(a.status, ArtifactStatus::Pending);
        repo.put_artifact_status(a.id, ArtifactStatus::Accepted).await.unwrap();
        let err = repo.put_artifact_status(a.id, ArtifactStatus::Rejected).await.unwrap_err();
        assert_eq!(err, RepositoryError::Conflict { id: a.id, current: ArtifactStatus::Accepted });
        assert_eq!(repo.get_artifact(a.id).await.unwrap().status, ArtifactStatus::Accepted);
    }

    #[tokio::test]
    async fn rating_is_visible_only_once_accepted() {
        let repo = InMemoryRepository::new();
        let a = repo.create_artifact(new_model()).await.unwrap();
        repo.put_rating(a.id, rating(&a)).await.unwrap();
        assert_eq!(repo.get_rating(a.id).await.unwrap(), None);
        repo.put_artifact_status(a.id, ArtifactStatus::Accepted).await.unwrap();
        assert!(repo.get_rating(a.id).await.unwrap().is_some());
        let err = repo.put_rating(a.id, rating(&a)).await.unwrap_err();
        assert_eq!(err, RepositoryError::Conflict { id: a.id, current: ArtifactStatus::Accepted });
    }

    #[tokio::test]
    async fn rejection_drops_staged_writes() {
        let repo = InMemoryRepository::new();
        let a = repo.create_artifact(new_model()).await.unwrap();
        repo.put_rating(a.id, rating(&a)).await.unwrap();
        repo.put_lineage(a.id, LineageGraph::default()).await.unwrap();
        repo.put_artifact_status(a.id, ArtifactStatus::Rejected).await.unwrap();
        assert_eq!(repo.get_rating(a.id).await.unwrap(), None);
        assert_eq!(repo.get_lineage(a.id).await.unwrap(), None);
        assert_eq!(repo.put_rating(a.id, rating(&a)).await, Err(RepositoryError::NotAccepted(a.id)));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let repo = InMemoryRepository::new();
        let id = ArtifactId::generate();
        assert_eq!(repo.get_artifact(id).await.unwrap_err(), RepositoryError::NotFound(id));
        assert_eq!(repo.get_lineage(id).await.unwrap_err(), RepositoryError::NotFound(id));
    }

    #[tokio::test]
    async fn details_keep_known_size() {
        let repo = InMemoryRepository::new();
        let a = repo.create_artifact(new_model()).await.unwrap();
        repo.put_artifact_details(a.id, "acme/tiny".into(), Some(12.0)).await.unwrap();
        repo.put_artifact_details(a.id, "acme/tiny".into(), None).await.unwrap();
        assert_eq!(repo.get_artifact(a.id).await.unwrap().size_mb, Some(12.0));
    }
}
