//! Stage outcomes and the orchestration journal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use a11y_types::RequestId;

/// The two queue stages of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Scan executor followed by the evidence synthesizer
    Scan,
    /// Document composer
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Scan => f.write_str("scan"),
            Stage::Report => f.write_str("report"),
        }
    }
}

/// What happened to a stage job
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<O> {
    /// Accepted by the stage queue
    Added,
    /// Finished with the stage's output
    Completed(O),
    /// Failed on its final attempt; carries the error chain
    Failed(String),
    /// Passed on from the previous stage. Only the orchestrator produces this.
    Handoff,
}

/// A job together with its latest outcome
#[derive(Debug, Clone)]
pub struct StageEvent<J, O> {
    pub job: J,
    pub outcome: Outcome<O>,
}

impl<O> Outcome<O> {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Added => "added",
            Outcome::Completed(_) => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Handoff => "handoff",
        }
    }
}

impl<J, O> StageEvent<J, O> {
    pub fn new(job: J, outcome: Outcome<O>) -> Self {
        Self { job, outcome }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JournalKind {
    Added,
    Completed,
    Failed { reason: String },
    Handoff,
}

impl<O> From<&Outcome<O>> for JournalKind {
    fn from(outcome: &Outcome<O>) -> Self {
        match outcome {
            Outcome::Added => JournalKind::Added,
            Outcome::Completed(_) => JournalKind::Completed,
            Outcome::Failed(reason) => JournalKind::Failed {
                reason: reason.clone(),
            },
            Outcome::Handoff => JournalKind::Handoff,
        }
    }
}

/// One handled stage outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub at: DateTime<Utc>,
    pub request_id: RequestId,
    pub stage: Stage,
    #[serde(flatten)]
    pub kind: JournalKind,
}

impl JournalEntry {
    pub fn now(request_id: RequestId, stage: Stage, kind: JournalKind) -> Self {
        Self {
            at: Utc::now(),
            request_id,
            stage,
            kind,
        }
    }
}

/// In-process fan-out of every outcome the orchestrator handles.
///
/// Entries are dropped when nobody is subscribed; slow subscribers see
/// `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct Journal {
    sender: broadcast::Sender<JournalEntry>,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JournalEntry> {
        self.sender.subscribe()
    }

    pub fn record(&self, entry: JournalEntry) {
        let _ = self.sender.send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_journal_kind_from_outcome() {
        assert_eq!(JournalKind::from(&Outcome::<()>::Added), JournalKind::Added);
        assert_eq!(
            JournalKind::from(&Outcome::Completed(7u32)),
            JournalKind::Completed
        );
        assert_eq!(
            JournalKind::from(&Outcome::<()>::Failed("boom".into())),
            JournalKind::Failed {
                reason: "boom".into()
            }
        );
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = JournalEntry::now(
            RequestId::new("r1"),
            Stage::Scan,
            JournalKind::Failed {
                reason: "timeout".into(),
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["request_id"], "r1");
        assert_eq!(json["stage"], "scan");
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["reason"], "timeout");
    }

    #[tokio::test]
    async fn test_journal_fans_out() {
        let journal = Journal::new(8);
        let mut a = journal.subscribe();
        let mut b = journal.subscribe();
        journal.record(JournalEntry::now(
            RequestId::new("r1"),
            Stage::Report,
            JournalKind::Handoff,
        ));

        assert_eq!(a.recv().await.unwrap().kind, JournalKind::Handoff);
        assert_eq!(b.recv().await.unwrap().stage, Stage::Report);
    }

    #[test]
    fn test_record_without_subscribers_is_fine() {
        let journal = Journal::new(1);
        journal.record(JournalEntry::now(
            RequestId::new("r1"),
            Stage::Scan,
            JournalKind::Added,
        ));
    }
}
