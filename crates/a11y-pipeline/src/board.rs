//! Current stage of every request the orchestrator has accepted

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use a11y_types::{JobStage, ReportJob, RequestId, TransitionError};

use crate::error::PipelineError;

/// Shared table of [`ReportJob`]s keyed by request id.
///
/// Cloning is cheap; all clones see the same table. Entries are never
/// evicted: terminal jobs stay so that a resubmitted id is still rejected as
/// a duplicate. The table grows by one entry per submission, which suits a
/// batch run of the worker but not an unbounded service.
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    jobs: Arc<RwLock<HashMap<RequestId, ReportJob>>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted job
    pub async fn insert(&self, job: ReportJob) -> Result<(), PipelineError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::DuplicateRequest(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Move a job forward; `Ok(false)` when it was already at `stage`
    pub async fn advance(&self, id: &RequestId, stage: JobStage) -> Result<bool, PipelineError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::UnknownRequest(id.clone()))?;
        Ok(job.advance(stage)?)
    }

    /// Like [`advance`](Self::advance) for intermediate stages, where a late or
    /// repeated signal is harmless: stale transitions are logged and dropped.
    pub async fn mark(&self, id: &RequestId, stage: JobStage) {
        match self.advance(id, stage).await {
            Ok(_) => {}
            Err(PipelineError::Transition(e @ TransitionError::Backwards { .. })) => {
                debug!("Ignoring stale stage signal for {}: {}", id, e);
            }
            Err(e) => warn!("Cannot mark {} as {}: {}", id, stage, e),
        }
    }

    pub async fn get(&self, id: &RequestId) -> Option<ReportJob> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn stage(&self, id: &RequestId) -> Option<JobStage> {
        self.jobs.read().await.get(id).map(|job| job.stage)
    }

    /// Every job, ordered by request id
    pub async fn snapshot(&self) -> Vec<ReportJob> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11y_types::{RequesterId, ScanSubmission};

    fn job(id: &str) -> ReportJob {
        ReportJob::queued(&ScanSubmission {
            target_domain: "https://example.com".into(),
            requester: RequesterId::new("u"),
            request_id: RequestId::new(id),
        })
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let board = JobBoard::new();
        board.insert(job("a")).await.unwrap();
        assert!(matches!(
            board.insert(job("a")).await,
            Err(PipelineError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_kept() {
        let board = JobBoard::new();
        let id = RequestId::new("done");
        board.insert(job("done")).await.unwrap();
        board.advance(&id, JobStage::Completed).await.unwrap();

        assert_eq!(board.stage(&id).await, Some(JobStage::Completed));
        assert!(matches!(
            board.insert(job("done")).await,
            Err(PipelineError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_unknown_request() {
        let board = JobBoard::new();
        assert!(matches!(
            board.advance(&RequestId::new("nope"), JobStage::Scanning).await,
            Err(PipelineError::UnknownRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_drops_stale_signals() {
        let board = JobBoard::new();
        let id = RequestId::new("a");
        board.insert(job("a")).await.unwrap();

        board.mark(&id, JobStage::Synthesizing).await;
        board.mark(&id, JobStage::Scanning).await;
        assert_eq!(board.stage(&id).await, Some(JobStage::Synthesizing));

        assert!(board.advance(&id, JobStage::Failed).await.unwrap());
        assert!(!board.advance(&id, JobStage::Failed).await.unwrap());
        board.mark(&id, JobStage::Composing).await;
        assert_eq!(board.stage(&id).await, Some(JobStage::Failed));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let board = JobBoard::new();
        let other = board.clone();
        board.insert(job("b")).await.unwrap();
        board.insert(job("a")).await.unwrap();

        let ids: Vec<_> = other
            .snapshot()
            .await
            .into_iter()
            .map(|job| job.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
