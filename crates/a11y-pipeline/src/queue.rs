//! Stage queues
//!
//! A stage queue accepts jobs over a channel and runs them on a
//! [`StageWorker`], at most `concurrency` at a time. Every job produces an
//! [`Outcome::Added`] when accepted and exactly one [`Outcome::Completed`] or
//! [`Outcome::Failed`] when done. A job is retried as a whole up to
//! `max_attempts` times; only the last failure is reported. A panicking worker
//! counts as a failed attempt.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use a11y_types::{JobStage, RequestId};

use crate::board::JobBoard;
use crate::error::PipelineError;
use crate::events::{Outcome, Stage, StageEvent};

/// A unit of work for one stage
pub trait StageJob: Clone + fmt::Debug + Send + Sync + 'static {
    fn request_id(&self) -> &RequestId;
}

/// What a worker may touch while running a job
#[derive(Debug, Clone)]
pub struct StageContext {
    board: JobBoard,
    attempt: u32,
}

impl StageContext {
    pub fn new(board: JobBoard) -> Self {
        Self { board, attempt: 1 }
    }

    /// One-based attempt number of the current run
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Report an intermediate stage of the job to the orchestrator's board
    pub async fn advance(&self, id: &RequestId, stage: JobStage) {
        self.board.mark(id, stage).await;
    }

    fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            board: self.board.clone(),
            attempt,
        }
    }
}

/// Executes the jobs of one stage
#[async_trait]
pub trait StageWorker<J: StageJob>: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn run(&self, job: &J, context: &StageContext) -> anyhow::Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
}

/// Producer side of a running stage queue
#[derive(Debug)]
pub struct StageQueue<J> {
    stage: Stage,
    sender: mpsc::UnboundedSender<J>,
}

impl<J> StageQueue<J> {
    pub fn enqueue(&self, job: J) -> Result<(), PipelineError> {
        self.sender
            .send(job)
            .map_err(|_| PipelineError::QueueClosed(self.stage))
    }
}

/// Hand an event to the control loop.
///
/// Returns `false` when the control loop is gone. The outcome is then lost and
/// the request never reaches a terminal status, so this is logged as an error.
pub(crate) fn emit<J, O>(
    events: &mpsc::UnboundedSender<StageEvent<J, O>>,
    event: StageEvent<J, O>,
) -> bool
where
    J: StageJob,
{
    match events.send(event) {
        Ok(()) => true,
        Err(mpsc::error::SendError(lost)) => {
            error!(
                "Lost {} outcome for {}: control loop is gone",
                lost.outcome.name(),
                lost.job.request_id()
            );
            false
        }
    }
}

/// Start a stage queue.
///
/// The queue runs until every [`StageQueue`] handle is dropped and all
/// accepted jobs have finished; then `events` is dropped.
pub fn spawn_stage<J, W>(
    stage: Stage,
    worker: W,
    settings: QueueSettings,
    context: StageContext,
    events: mpsc::UnboundedSender<StageEvent<J, W::Output>>,
) -> (StageQueue<J>, JoinHandle<()>)
where
    J: StageJob,
    W: StageWorker<J>,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let settings = QueueSettings {
        concurrency: settings.concurrency.max(1),
        max_attempts: settings.max_attempts.max(1),
    };
    let handle = tokio::spawn(run_stage(
        stage,
        Arc::new(worker),
        settings,
        context,
        receiver,
        events,
    ));
    (StageQueue { stage, sender }, handle)
}

#[instrument(skip_all, fields(stage = %stage, concurrency = settings.concurrency))]
async fn run_stage<J, W>(
    stage: Stage,
    worker: Arc<W>,
    settings: QueueSettings,
    context: StageContext,
    mut receiver: mpsc::UnboundedReceiver<J>,
    events: mpsc::UnboundedSender<StageEvent<J, W::Output>>,
) where
    J: StageJob,
    W: StageWorker<J>,
{
    let permits = Arc::new(Semaphore::new(settings.concurrency));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            job = receiver.recv() => {
                let Some(job) = job else { break };
                debug!("Accepted job for {}", job.request_id());
                emit(&events, StageEvent::new(job.clone(), Outcome::Added));

                let permits = Arc::clone(&permits);
                let worker = Arc::clone(&worker);
                let context = context.clone();
                let events = events.clone();
                let max_attempts = settings.max_attempts;
                tasks.spawn(async move {
                    // the semaphore is never closed
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    let outcome = match run_attempts(stage, worker, &job, &context, max_attempts).await {
                        Ok(output) => Outcome::Completed(output),
                        Err(reason) => Outcome::Failed(reason),
                    };
                    emit(&events, StageEvent::new(job, outcome));
                });
            }
            Some(joined) = tasks.join_next() => {
                if let Err(e) = joined {
                    error!("Stage task aborted: {}", e);
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Stage task aborted: {}", e);
        }
    }
    info!("Stage queue drained");
}

/// Run `job` until it succeeds or runs out of attempts
async fn run_attempts<J, W>(
    stage: Stage,
    worker: Arc<W>,
    job: &J,
    context: &StageContext,
    max_attempts: u32,
) -> Result<W::Output, String>
where
    J: StageJob,
    W: StageWorker<J>,
{
    let mut last_error = format!("{} job was never attempted", stage);
    for attempt in 1..=max_attempts {
        let worker = Arc::clone(&worker);
        let attempt_job = job.clone();
        let attempt_context = context.for_attempt(attempt);
        // separate task so a panic is contained to this attempt
        let result =
            tokio::spawn(async move { worker.run(&attempt_job, &attempt_context).await }).await;

        last_error = match result {
            Ok(Ok(output)) => return Ok(output),
            Ok(Err(e)) => format!("{:#}", e),
            Err(e) if e.is_panic() => format!("{} worker panicked", stage),
            Err(e) => format!("{} worker task failed: {}", stage, e),
        };

        if attempt < max_attempts {
            warn!(
                "Attempt {}/{} for {} failed, retrying: {}",
                attempt,
                max_attempts,
                job.request_id(),
                last_error
            );
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Job(RequestId);

    impl StageJob for Job {
        fn request_id(&self) -> &RequestId {
            &self.0
        }
    }

    fn job(id: &str) -> Job {
        Job(RequestId::new(id))
    }

    /// Fails until the given attempt, then echoes the attempt number
    struct Flaky {
        succeed_on: u32,
    }

    #[async_trait]
    impl StageWorker<Job> for Flaky {
        type Output = u32;

        async fn run(&self, _job: &Job, context: &StageContext) -> anyhow::Result<u32> {
            if context.attempt() < self.succeed_on {
                anyhow::bail!("attempt {} failed", context.attempt());
            }
            Ok(context.attempt())
        }
    }

    struct Panicky;

    #[async_trait]
    impl StageWorker<Job> for Panicky {
        type Output = ();

        async fn run(&self, _job: &Job, _context: &StageContext) -> anyhow::Result<()> {
            panic!("worker blew up");
        }
    }

    /// Tracks how many jobs run at once
    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
        runs: AtomicU32,
    }

    #[async_trait]
    impl StageWorker<Job> for Arc<Gauge> {
        type Output = ();

        async fn run(&self, _job: &Job, _context: &StageContext) -> anyhow::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn run_jobs<W: StageWorker<Job>>(
        worker: W,
        settings: QueueSettings,
        jobs: Vec<Job>,
    ) -> Vec<StageEvent<Job, W::Output>> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (queue, handle) = spawn_stage(
            Stage::Scan,
            worker,
            settings,
            StageContext::new(JobBoard::new()),
            events_tx,
        );
        for job in jobs {
            queue.enqueue(job).unwrap();
        }
        drop(queue);
        handle.await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            events.push(event);
        }
        events
    }

    fn settings(concurrency: usize, max_attempts: u32) -> QueueSettings {
        QueueSettings {
            concurrency,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_added_then_completed() {
        let events = run_jobs(Flaky { succeed_on: 1 }, settings(2, 1), vec![job("a")]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, Outcome::Added);
        assert_eq!(events[1].outcome, Outcome::Completed(1));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let events = run_jobs(Flaky { succeed_on: 3 }, settings(1, 3), vec![job("a")]).await;
        assert_eq!(events[1].outcome, Outcome::Completed(3));
    }

    #[tokio::test]
    async fn test_only_final_failure_is_reported() {
        let events = run_jobs(Flaky { succeed_on: 5 }, settings(1, 2), vec![job("a")]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].outcome, Outcome::Failed("attempt 2 failed".into()));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let events = run_jobs(Panicky, settings(1, 1), vec![job("a"), job("b")]).await;
        let failures = events
            .iter()
            .filter(|e| matches!(&e.outcome, Outcome::Failed(reason) if reason.contains("panicked")))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gauge = Arc::new(Gauge {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            runs: AtomicU32::new(0),
        });
        let jobs = (0..6).map(|i| job(&format!("j{}", i))).collect();
        let events = run_jobs(Arc::clone(&gauge), settings(2, 1), jobs).await;

        assert_eq!(events.len(), 12);
        assert_eq!(gauge.runs.load(Ordering::SeqCst), 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_settings_are_clamped() {
        let events = run_jobs(Flaky { succeed_on: 1 }, settings(0, 0), vec![job("a")]).await;
        assert_eq!(events[1].outcome, Outcome::Completed(1));
    }

    #[tokio::test]
    async fn test_emit_reports_lost_events() {
        let (events_tx, events_rx) = mpsc::unbounded_channel::<StageEvent<Job, u32>>();
        assert!(emit(&events_tx, StageEvent::new(job("a"), Outcome::Added)));
        drop(events_rx);
        assert!(!emit(
            &events_tx,
            StageEvent::new(job("a"), Outcome::Failed("boom".into()))
        ));
    }

    #[tokio::test]
    async fn test_queue_drains_without_control_loop() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        let (queue, handle) = spawn_stage(
            Stage::Scan,
            Flaky { succeed_on: 2 },
            settings(1, 1),
            StageContext::new(JobBoard::new()),
            events_tx,
        );
        queue.enqueue(job("a")).unwrap();
        queue.enqueue(job("b")).unwrap();
        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_after_close_fails() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel::<StageEvent<Job, u32>>();
        let (queue, handle) = spawn_stage(
            Stage::Report,
            Flaky { succeed_on: 1 },
            settings(1, 1),
            StageContext::new(JobBoard::new()),
            events_tx,
        );
        handle.abort();
        let _ = handle.await;
        assert!(matches!(
            queue.enqueue(job("late")),
            Err(PipelineError::QueueClosed(Stage::Report))
        ));
    }
}
