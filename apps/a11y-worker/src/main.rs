//! Accessibility report worker
//!
//! Reads scan submissions as JSON lines on stdin, for example
//!
//! ```text
//! {"targetDomain":"https://example.com","requesterIdentity":"user-1","requestId":"req-1"}
//! ```
//!
//! runs each through the scan and report stages, and once stdin closes prints
//! one JSON line per request with its terminal status. `requestId` may be
//! left out; a fresh id is generated then.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use a11y_capture::ScanExecutor;
use a11y_composer::ReportComposer;
use a11y_pipeline::{
    CaptureWorker, ComposeWorker, InMemoryStatusStore, Orchestrator, StatusRecord, WorkerConfig,
};
use a11y_types::{ArtifactLayout, RequestId, ScanSubmission, TerminalStatus};

const CONFIG_ENV: &str = "A11Y_WORKER_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("a11y_worker=info".parse()?)
                .add_directive("a11y_pipeline=info".parse()?)
                .add_directive("a11y_capture=info".parse()?)
                .add_directive("a11y_composer=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            WorkerConfig::from_file(&path)?
        }
        Err(_) => {
            info!("{} not set, using default configuration", CONFIG_ENV);
            WorkerConfig::default()
        }
    };

    let executor = ScanExecutor::from_script_file(&config.axe_script).with_context(|| {
        format!("Failed to load axe-core from {}", config.axe_script.display())
    })?;
    tokio::fs::create_dir_all(&config.artifacts_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create artifacts root {}",
                config.artifacts_root.display()
            )
        })?;
    let artifacts = ArtifactLayout::new(&config.artifacts_root);

    let store = Arc::new(InMemoryStatusStore::new());
    let orchestrator = Orchestrator::start(
        &config.pipeline,
        CaptureWorker::new(config.session.clone(), executor, artifacts.clone()),
        ComposeWorker::new(ReportComposer::new(config.report.clone()), artifacts),
        store.clone(),
    );

    let mut journal = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match journal.recv().await {
                Ok(entry) => debug!(
                    "journal: {} {} {:?}",
                    entry.request_id, entry.stage, entry.kind
                ),
                Err(RecvError::Lagged(skipped)) => warn!("Journal lagged by {} entries", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_submission(&line) {
            None => continue,
            Some(Ok(submission)) => {
                let request_id = submission.request_id.clone();
                match orchestrator.submit(submission).await {
                    Ok(()) => accepted += 1,
                    Err(e) => warn!("Rejected submission {}: {}", request_id, e),
                }
            }
            Some(Err(e)) => warn!("Ignoring malformed submission: {}", e),
        }
    }

    info!("Input closed after {} submissions, waiting for jobs", accepted);
    orchestrator.shutdown().await?;

    for (request_id, record) in store.statuses().await {
        println!("{}", serde_json::to_string(&StatusLine::new(&request_id, &record))?);
    }
    Ok(())
}

/// Parse one input line; blank lines yield `None`
fn parse_submission(line: &str) -> Option<serde_json::Result<ScanSubmission>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusLine<'a> {
    request_id: &'a RequestId,
    status: TerminalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_path: Option<&'a PathBuf>,
}

impl<'a> StatusLine<'a> {
    fn new(request_id: &'a RequestId, record: &'a StatusRecord) -> Self {
        Self {
            request_id,
            status: record.status,
            artifact_path: record.artifact.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_submission() {
        assert!(parse_submission("   ").is_none());

        let submission = parse_submission(
            r#"{"targetDomain":"https://a.org","requesterIdentity":"u1","requestId":"r1"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(submission.request_id.as_str(), "r1");

        let anonymous =
            parse_submission(r#"{"targetDomain":"https://a.org","requesterIdentity":"u1"}"#)
                .unwrap()
                .unwrap();
        assert!(anonymous.request_id.is_path_safe());

        assert!(parse_submission("{not json").unwrap().is_err());
    }

    #[test]
    fn test_status_line_format() {
        let id = RequestId::new("r1");
        let completed = StatusRecord {
            status: TerminalStatus::Completed,
            artifact: Some(PathBuf::from("/data/r1/report.pdf")),
        };
        assert_eq!(
            serde_json::to_string(&StatusLine::new(&id, &completed)).unwrap(),
            r#"{"requestId":"r1","status":"COMPLETED","artifactPath":"/data/r1/report.pdf"}"#
        );

        let failed = StatusRecord {
            status: TerminalStatus::Failed,
            artifact: None,
        };
        assert_eq!(
            serde_json::to_string(&StatusLine::new(&id, &failed)).unwrap(),
            r#"{"requestId":"r1","status":"FAILED"}"#
        );
    }
}
