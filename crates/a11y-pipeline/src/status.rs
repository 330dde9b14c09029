//! Outbound status reporting
//!
//! The pipeline never decides anything about users or billing. It only tells
//! the [`StatusSink`] how a request ended and, on failure, that the requester's
//! usage unit should be given back.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use a11y_types::{RequestId, RequesterId, TerminalStatus};

use crate::error::StatusError;

/// Receiver of terminal request outcomes.
///
/// Both calls must be idempotent: repeating an identical call is a no-op.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update_status(
        &self,
        request_id: &RequestId,
        status: TerminalStatus,
        artifact: Option<&Path>,
    ) -> Result<(), StatusError>;

    /// Give one usage unit back to the requester of `request_id`
    async fn refund_quota(
        &self,
        request_id: &RequestId,
        requester: &RequesterId,
    ) -> Result<(), StatusError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub status: TerminalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Status sink that keeps everything in memory.
///
/// Records live until the store is dropped, one per terminal request, so a
/// long-running deployment should put a persistent [`StatusSink`] in its place.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    statuses: RwLock<HashMap<RequestId, StatusRecord>>,
    refunds: RwLock<HashMap<RequestId, RequesterId>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self, request_id: &RequestId) -> Option<StatusRecord> {
        self.statuses.read().await.get(request_id).cloned()
    }

    /// All recorded statuses, ordered by request id
    pub async fn statuses(&self) -> Vec<(RequestId, StatusRecord)> {
        let mut all: Vec<_> = self
            .statuses
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of units refunded to `requester`
    pub async fn refunds_for(&self, requester: &RequesterId) -> usize {
        self.refunds
            .read()
            .await
            .values()
            .filter(|r| *r == requester)
            .count()
    }

    pub async fn refund_count(&self) -> usize {
        self.refunds.read().await.len()
    }
}

#[async_trait]
impl StatusSink for InMemoryStatusStore {
    async fn update_status(
        &self,
        request_id: &RequestId,
        status: TerminalStatus,
        artifact: Option<&Path>,
    ) -> Result<(), StatusError> {
        let record = StatusRecord {
            status,
            artifact: artifact.map(Path::to_path_buf),
        };
        let mut statuses = self.statuses.write().await;
        match statuses.get(request_id) {
            Some(existing) if *existing == record => Ok(()),
            Some(existing) => Err(StatusError::Conflict {
                request_id: request_id.clone(),
                recorded: existing.status,
                requested: status,
            }),
            None => {
                statuses.insert(request_id.clone(), record);
                Ok(())
            }
        }
    }

    async fn refund_quota(
        &self,
        request_id: &RequestId,
        requester: &RequesterId,
    ) -> Result<(), StatusError> {
        self.refunds
            .write()
            .await
            .entry(request_id.clone())
            .or_insert_with(|| requester.clone());
        Ok(())
    }
}
