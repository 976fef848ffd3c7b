//! Run Reporter: the append-only progress event stream and final summary of one run.
//!
//! Shared between the running controller and the HTTP status handler. Readers poll with
//! `snapshot(since)` and receive only events they have not seen.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::automation::models::{ApplicationOutcome, JobListing, OutcomeStatus, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Login,
    Profile,
    Search,
    Applying,
    Outcome,
    ManualIntervention,
    Stopped,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub seq: usize,
    pub timestamp: DateTime<Utc>,
    pub job_id: Option<String>,
    pub stage: Stage,
    pub message: String,
    pub outcome_status: Option<OutcomeStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Complete,
    Terminated,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub state: RunState,
    pub progress: u8,
    pub events: Vec<ProgressEvent>,
    pub next_since: usize,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

struct ReporterState {
    run_state: RunState,
    events: Vec<ProgressEvent>,
    submitted: u32,
    summary: Option<RunSummary>,
    error: Option<String>,
}

pub struct RunReporter {
    application_cap: u32,
    inner: Mutex<ReporterState>,
}

impl RunReporter {
    pub fn new(application_cap: u32) -> Self {
        Self {
            application_cap,
            inner: Mutex::new(ReporterState {
                run_state: RunState::Running,
                events: Vec::new(),
                submitted: 0,
                summary: None,
                error: None,
            }),
        }
    }

    pub fn emit(&self, stage: Stage, message: impl Into<String>) {
        self.push(None, stage, message.into(), None);
    }

    pub fn emit_job(&self, job: &JobListing, stage: Stage, message: impl Into<String>) {
        self.push(Some(job.id.clone()), stage, message.into(), None);
    }

    pub fn record_outcome(&self, outcome: &ApplicationOutcome) {
        let message = match outcome.reason {
            Some(reason) => format!(
                "{} at {}: {} ({})",
                outcome.title,
                outcome.company,
                outcome.status.as_str(),
                reason.as_str()
            ),
            None => format!(
                "{} at {}: {} ({} fields from profile, {} from AI)",
                outcome.title,
                outcome.company,
                outcome.status.as_str(),
                outcome.resolution.deterministic,
                outcome.resolution.ai
            ),
        };
        if outcome.status == OutcomeStatus::Submitted {
            self.lock().submitted += 1;
        }
        self.push(
            Some(outcome.job_id.clone()),
            Stage::Outcome,
            message,
            Some(outcome.status),
        );
    }

    pub fn finish(&self, summary: RunSummary) {
        let message = format!(
            "Run finished: {} submitted, {} skipped, {} failed",
            summary.counts.submitted, summary.counts.skipped, summary.counts.failed
        );
        {
            let mut inner = self.lock();
            inner.run_state = if summary.terminated_early {
                RunState::Terminated
            } else {
                RunState::Complete
            };
            inner.summary = Some(summary);
        }
        self.emit(Stage::Done, message);
    }

    pub fn fail(&self, error: impl Into<String>, summary: Option<RunSummary>) {
        let error = error.into();
        {
            let mut inner = self.lock();
            inner.run_state = RunState::Error;
            inner.summary = summary;
            inner.error = Some(error.clone());
        }
        self.emit(Stage::Error, error);
    }

    pub fn is_running(&self) -> bool {
        self.lock().run_state == RunState::Running
    }

    /// State plus every event with `seq >= since`.
    pub fn snapshot(&self, since: usize) -> RunSnapshot {
        let inner = self.lock();
        RunSnapshot {
            state: inner.run_state,
            progress: progress(&inner, self.application_cap),
            events: inner.events.iter().skip(since).cloned().collect(),
            next_since: inner.events.len(),
            summary: inner.summary.clone(),
            error: inner.error.clone(),
        }
    }

    fn push(
        &self,
        job_id: Option<String>,
        stage: Stage,
        message: String,
        outcome_status: Option<OutcomeStatus>,
    ) {
        match stage {
            Stage::Error | Stage::ManualIntervention => {
                warn!(job_id = job_id.as_deref(), ?stage, "{message}")
            }
            _ => info!(job_id = job_id.as_deref(), ?stage, "{message}"),
        }
        let mut inner = self.lock();
        let seq = inner.events.len();
        inner.events.push(ProgressEvent {
            seq,
            timestamp: Utc::now(),
            job_id,
            stage,
            message,
            outcome_status,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Submitted applications as a share of the cap; 100 once the run has ended.
fn progress(inner: &ReporterState, cap: u32) -> u8 {
    if inner.run_state != RunState::Running {
        return 100;
    }
    if cap == 0 {
        return 0;
    }
    (inner.submitted.min(cap) * 100 / cap) as u8
}
