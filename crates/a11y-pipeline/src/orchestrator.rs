//! Job orchestration across the scan and report stages
//!
//! Submissions enter the scan queue. Both queues report back to a single
//! control loop, which dispatches on the outcome:
//!
//! - `Added`: logged, the board moves to the stage's first state
//! - `Completed` from the scan stage: handoff of a [`ComposeJob`] to the report queue
//! - `Handoff`: enqueue on the report queue
//! - `Completed` from the report stage: status `Completed` with the report path
//! - `Failed` from either stage: refund and status `Failed`
//!
//! The failed handler is the only place compensation happens, and the board's
//! terminal transition makes it run at most once per request.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use a11y_types::{JobStage, ReportJob, RequestId, RequesterId, ScanSubmission, TerminalStatus};

use crate::board::JobBoard;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{Journal, JournalEntry, JournalKind, Outcome, Stage, StageEvent};
use crate::jobs::{ComposeJob, ReportArtifact, ScanArtifacts, ScanJob};
use crate::queue::{emit, spawn_stage, StageContext, StageQueue, StageWorker};
use crate::status::StatusSink;

type ScanEvent = StageEvent<ScanJob, ScanArtifacts>;
type ReportEvent = StageEvent<ComposeJob, ReportArtifact>;

/// Running pipeline
pub struct Orchestrator {
    scan_queue: StageQueue<ScanJob>,
    scan_events: mpsc::UnboundedSender<ScanEvent>,
    board: JobBoard,
    journal: Journal,
    control: JoinHandle<()>,
    stages: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn both stage queues and the control loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S, R>(
        config: &PipelineConfig,
        scan_worker: S,
        report_worker: R,
        sink: Arc<dyn StatusSink>,
    ) -> Self
    where
        S: StageWorker<ScanJob, Output = ScanArtifacts>,
        R: StageWorker<ComposeJob, Output = ReportArtifact>,
    {
        let board = JobBoard::new();
        let journal = Journal::new(config.journal_capacity);
        let context = StageContext::new(board.clone());

        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (scan_queue, scan_stage) = spawn_stage(
            Stage::Scan,
            scan_worker,
            config.scan_settings(),
            context.clone(),
            scan_tx.clone(),
        );
        let (report_queue, report_stage) = spawn_stage(
            Stage::Report,
            report_worker,
            config.report_settings(),
            context,
            report_tx,
        );

        let control = ControlLoop {
            board: board.clone(),
            journal: journal.clone(),
            sink,
            report_queue: Some(report_queue),
        };
        let control = tokio::spawn(control.run(scan_rx, report_rx));

        info!(
            "Orchestrator started: scan concurrency {}, report concurrency {}, max attempts {}",
            config.scan_concurrency, config.report_concurrency, config.max_attempts
        );

        Self {
            scan_queue,
            scan_events: scan_tx,
            board,
            journal,
            control,
            stages: vec![scan_stage, report_stage],
        }
    }

    /// Accept a submission into the scan queue.
    ///
    /// A request id that is already known is rejected without touching the
    /// existing job. Everything that goes wrong after acceptance is reported
    /// through the status sink instead, unless the control loop itself is
    /// gone; then the enqueue error is returned.
    #[instrument(skip_all, fields(request_id = %submission.request_id))]
    pub async fn submit(&self, submission: ScanSubmission) -> Result<(), PipelineError> {
        self.board.insert(ReportJob::queued(&submission)).await?;

        let job = ScanJob::from(submission);
        if let Err(e) = self.scan_queue.enqueue(job.clone()) {
            warn!("Enqueue failed: {}", e);
            let failed = StageEvent::new(job, Outcome::Failed(e.to_string()));
            if !emit(&self.scan_events, failed) {
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    /// Every outcome handled from now on, in handling order
    pub fn subscribe(&self) -> broadcast::Receiver<JournalEntry> {
        self.journal.subscribe()
    }

    /// Stop accepting submissions and wait until every accepted request has
    /// reached a terminal state.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        let Self {
            scan_queue,
            scan_events,
            control,
            stages,
            ..
        } = self;
        drop(scan_queue);
        drop(scan_events);

        control.await?;
        for stage in stages {
            stage.await?;
        }
        info!("Orchestrator stopped");
        Ok(())
    }
}

struct ControlLoop {
    board: JobBoard,
    journal: Journal,
    sink: Arc<dyn StatusSink>,
    /// Dropped once the scan stage is closed, which lets the report stage drain
    report_queue: Option<StageQueue<ComposeJob>>,
}

impl ControlLoop {
    async fn run(
        mut self,
        mut scan_events: mpsc::UnboundedReceiver<ScanEvent>,
        mut report_events: mpsc::UnboundedReceiver<ReportEvent>,
    ) {
        let mut scan_open = true;
        loop {
            tokio::select! {
                event = scan_events.recv(), if scan_open => match event {
                    Some(event) => self.on_scan(event).await,
                    None => {
                        debug!("Scan stage closed, closing report stage");
                        scan_open = false;
                        self.report_queue = None;
                    }
                },
                event = report_events.recv() => match event {
                    Some(event) => self.on_report(event).await,
                    None => {
                        if scan_open {
                            error!("Report stage stopped while scans were still running");
                        }
                        break;
                    }
                },
            }
        }
        info!("Control loop stopped");
    }

    fn record<O>(&self, request_id: &RequestId, stage: Stage, outcome: &Outcome<O>) {
        self.journal.record(JournalEntry::now(
            request_id.clone(),
            stage,
            JournalKind::from(outcome),
        ));
    }

    async fn on_scan(&mut self, event: ScanEvent) {
        let StageEvent { job, outcome } = event;
        self.record(&job.request_id, Stage::Scan, &outcome);

        match outcome {
            Outcome::Added => {
                info!(request_id = %job.request_id, "Scan job added for {}", job.target_domain);
                self.board.mark(&job.request_id, JobStage::Scanning).await;
            }
            Outcome::Completed(artifacts) => {
                info!(
                    request_id = %job.request_id,
                    "Scan completed: {} violations, {} crops",
                    artifacts.violations,
                    artifacts.crops
                );
                let next = ComposeJob::handoff(&job, &artifacts);
                self.on_report(StageEvent::new(next, Outcome::Handoff)).await;
            }
            Outcome::Failed(reason) => {
                self.on_failed(Stage::Scan, &job.request_id, &job.requester, &reason)
                    .await;
            }
            Outcome::Handoff => {
                debug!("Scan jobs enter through submit, ignoring handoff");
            }
        }
    }

    async fn on_report(&mut self, event: ReportEvent) {
        let StageEvent { job, outcome } = event;
        self.record(&job.request_id, Stage::Report, &outcome);

        match outcome {
            Outcome::Handoff => {
                self.board.mark(&job.request_id, JobStage::Composing).await;
                let enqueued = match &self.report_queue {
                    Some(queue) => queue.enqueue(job.clone()),
                    None => Err(PipelineError::QueueClosed(Stage::Report)),
                };
                if let Err(e) = enqueued {
                    let reason = format!("Handoff failed: {}", e);
                    self.journal.record(JournalEntry::now(
                        job.request_id.clone(),
                        Stage::Report,
                        JournalKind::Failed {
                            reason: reason.clone(),
                        },
                    ));
                    self.on_failed(Stage::Report, &job.request_id, &job.requester, &reason)
                        .await;
                }
            }
            Outcome::Added => {
                debug!(request_id = %job.request_id, "Report job added");
            }
            Outcome::Completed(artifact) => self.on_completed(&job.request_id, &artifact).await,
            Outcome::Failed(reason) => {
                self.on_failed(Stage::Report, &job.request_id, &job.requester, &reason)
                    .await;
            }
        }
    }

    async fn on_completed(&self, request_id: &RequestId, artifact: &ReportArtifact) {
        match self.board.advance(request_id, JobStage::Completed).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} already completed", request_id);
                return;
            }
            Err(e) => {
                warn!("Ignoring completion of {}: {}", request_id, e);
                return;
            }
        }

        info!(
            request_id = %request_id,
            "Report ready at {} ({} pages)",
            artifact.report_file.display(),
            artifact.pages
        );
        if let Err(e) = self
            .sink
            .update_status(request_id, TerminalStatus::Completed, Some(&artifact.report_file))
            .await
        {
            error!("Status update for {} failed: {}", request_id, e);
        }
    }

    async fn on_failed(
        &self,
        stage: Stage,
        request_id: &RequestId,
        requester: &RequesterId,
        reason: &str,
    ) {
        match self.board.advance(request_id, JobStage::Failed).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} already failed, compensation done", request_id);
                return;
            }
            Err(e) => {
                warn!("Ignoring {} failure of {}: {}", stage, request_id, e);
                return;
            }
        }

        warn!(request_id = %request_id, "{} stage failed: {}", stage, reason);
        if let Err(e) = self.sink.refund_quota(request_id, requester).await {
            error!("Refund for {} failed: {}", request_id, e);
        }
        if let Err(e) = self
            .sink
            .update_status(request_id, TerminalStatus::Failed, None)
            .await
        {
            error!("Status update for {} failed: {}", request_id, e);
        }
    }
}
