use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::error::{Result, TarjimError};
use crate::pipeline::{FilePipeline, PipelineOutcome};
use crate::status::{JobLease, JobStatus, StatusStore};
use crate::stop::StopToken;
use crate::worklist::{OutcomeSink, WorkItem, WorklistSource};

/// Batch job lifecycle. Terminal states transition back to the start only
/// when a new batch is explicitly started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Scanning,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Output already existed
    pub skipped: usize,
    /// Missing on disk or blacklisted
    pub ignored: usize,
}

/// Runs the worklist through the single-file pipeline, one item at a time.
/// At most one batch runs per process (state check) and per machine (lease).
pub struct BatchOrchestrator {
    pipeline: Arc<dyn FilePipeline>,
    worklist: Arc<dyn WorklistSource>,
    outcomes: Arc<dyn OutcomeSink>,
    status: StatusStore,
    lease: JobLease,
    blacklist: HashSet<PathBuf>,
    target_language: String,
    state: Mutex<JobState>,
    stop: StopToken,
}

impl BatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Arc<dyn FilePipeline>,
        worklist: Arc<dyn WorklistSource>,
        outcomes: Arc<dyn OutcomeSink>,
        status: StatusStore,
        lease: JobLease,
        blacklist: HashSet<PathBuf>,
        target_language: String,
    ) -> Self {
        Self {
            pipeline,
            worklist,
            outcomes,
            status,
            lease,
            blacklist,
            target_language,
            state: Mutex::new(JobState::Idle),
            stop: StopToken::new(),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Token for best-effort cancellation of the running batch. Stopping
    /// kills the in-flight external step; partially-written artifacts of
    /// that step are not rolled back.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    fn enter_scanning(&self) -> Result<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        match *state {
            JobState::Scanning | JobState::Running => Err(TarjimError::Conflict(
                "a batch is already running in this process".to_string(),
            )),
            _ => {
                *state = JobState::Scanning;
                Ok(())
            }
        }
    }

    fn set_state(&self, next: JobState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    /// Run the whole worklist. A single file's failure never aborts the
    /// batch; only an internal fault (unreadable worklist, unwritable
    /// status) does.
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        self.enter_scanning()?;

        // Cross-process single flight: claimed for the whole batch,
        // released when the guard drops on every exit path.
        let lease_guard = match self.lease.claim() {
            Ok(guard) => guard,
            Err(e) => {
                self.set_state(JobState::Idle);
                return Err(e);
            }
        };
        info!("Claimed batch lease as {}", lease_guard.owner());

        match self.run_batch_inner(&lease_guard).await {
            Ok(summary) => {
                self.set_state(JobState::Completed);
                Ok(summary)
            }
            Err(e) => {
                error!("Batch aborted: {}", e);
                self.set_state(JobState::Failed);
                let _ = self.status.write(&JobStatus::phase(
                    100,
                    format!("Batch failed: {}", e),
                ));
                Err(e)
            }
        }
    }

    async fn run_batch_inner(&self, lease: &crate::status::LeaseGuard) -> Result<BatchSummary> {
        self.status
            .write(&JobStatus::phase(0, "Scanning worklist..."))?;

        let pending = self
            .worklist
            .pending()
            .map_err(|e| TarjimError::Orchestrator(format!("worklist unreadable: {}", e)))?;
        let items: Vec<WorkItem> = pending
            .into_iter()
            .map(|path| WorkItem::new(path, &self.target_language))
            .collect();

        let total = items.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        if total == 0 {
            self.status.write(&JobStatus {
                progress: 100,
                current_file: String::new(),
                total_files: 0,
                files_done: 0,
                task: "No files to translate.".to_string(),
            })?;
            info!("Worklist is empty, nothing to do");
            return Ok(summary);
        }

        info!("Starting batch of {} file(s)", total);
        self.set_state(JobState::Running);

        for (position, item) in items.iter().enumerate() {
            let index = position + 1;

            if self.stop.is_stopped() {
                warn!("Batch stopped after {} of {} item(s)", position, total);
                self.status.write(&JobStatus {
                    progress: 100,
                    current_file: String::new(),
                    total_files: total,
                    files_done: position,
                    task: "Batch stopped.".to_string(),
                })?;
                return Ok(summary);
            }

            let name = item.file_name();
            self.status.write(&JobStatus {
                progress: (index * 100 / total) as u32,
                current_file: name.clone(),
                total_files: total,
                files_done: position,
                task: format!("({}/{}) {}", index, total, name),
            })?;

            if let Err(e) = lease.heartbeat() {
                warn!("Failed to refresh batch lease: {}", e);
            }

            if !item.path.exists() {
                info!("Skipping missing file: {}", item.path.display());
                summary.ignored += 1;
                continue;
            }
            if self.blacklist.contains(&item.path) {
                info!("Skipping blacklisted file: {}", item.path.display());
                summary.ignored += 1;
                continue;
            }

            match self.pipeline.process_file(&item.path, &self.stop).await {
                Ok(PipelineOutcome::Completed(report)) => {
                    if report.is_degraded() {
                        warn!(
                            "{}: {}/{} chunks kept source text",
                            name, report.chunks_degraded, report.chunks_total
                        );
                    }
                    summary.succeeded += 1;
                    if let Err(e) = self
                        .outcomes
                        .record_success(&item.path, report.chunks_degraded)
                    {
                        warn!("Failed to record outcome for {}: {}", name, e);
                    }
                }
                Ok(PipelineOutcome::Skipped) => {
                    summary.skipped += 1;
                    if let Err(e) = self.outcomes.record_success(&item.path, 0) {
                        warn!("Failed to record outcome for {}: {}", name, e);
                    }
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", name, e);
                    summary.failed += 1;
                    if let Err(record_err) =
                        self.outcomes.record_failure(&item.path, &e.to_string())
                    {
                        warn!("Failed to record outcome for {}: {}", name, record_err);
                    }
                }
            }
        }

        self.status.write(&JobStatus {
            progress: 100,
            current_file: String::new(),
            total_files: total,
            files_done: total,
            task: "Batch translation finished.".to_string(),
        })?;
        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped, {} ignored",
            summary.succeeded, summary.failed, summary.skipped, summary.ignored
        );

        Ok(summary)
    }
}
