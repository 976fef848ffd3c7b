//! Job Session Controller: one run from login to summary.
//!
//! Jobs are processed strictly one after another on a single browser page. Each job runs
//! under its own timeout and every per-job failure is converted into an outcome, so a bad
//! listing never ends the run. Only login failure, an unreadable resume, an empty search
//! or a verification checkpoint stop the run early.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::automation::board::{BoardError, BoardSettings, JobBoard, SearchQuery};
use crate::automation::browser::BrowserPage;
use crate::automation::classifier::FieldClassifier;
use crate::automation::models::{
    ApplicationOutcome, JobListing, JobStatus, OutcomeStatus, ReasonCode, ResolutionSummary,
    RunSummary, TerminationReason,
};
use crate::automation::navigator::{FormNavigator, JobError, NavigatorSettings};
use crate::automation::reporter::{RunReporter, Stage};
use crate::automation::resolver::{FieldResolver, ResolverSettings};
use crate::automation::run_config::RunConfiguration;
use crate::automation::sink::{ApplicationLogSink, LocalLogSink};
use crate::automation::timing::{Interval, TimingProfile, TimingSimulator};
use crate::llm_client::CompletionService;
use crate::profile::extract::{extract_resume_text, LlmProfileBuilder, ProfileBuilder, ProfileError};
use crate::profile::CandidateProfile;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("resume could not be used: {0}")]
    Profile(#[from] ProfileError),

    #[error("no quick-apply jobs matched the search")]
    NoResults,

    #[error("job search failed: {0}")]
    Search(String),

    #[error("manual verification required at {0}")]
    ManualInterventionRequired(String),
}

impl RunError {
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            RunError::Authentication(_) => TerminationReason::AuthenticationFailed,
            RunError::Profile(_) => TerminationReason::ProfileUnavailable,
            RunError::NoResults => TerminationReason::NoResults,
            RunError::Search(_) => TerminationReason::SearchFailed,
            RunError::ManualInterventionRequired(_) => {
                TerminationReason::ManualInterventionRequired
            }
        }
    }
}

/// A fatal run error together with the summary of what happened before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunAborted {
    pub error: RunError,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub job_timeout: Duration,
    pub board: BoardSettings,
    pub navigator: NavigatorSettings,
    pub resolver: ResolverSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300),
            board: BoardSettings::default(),
            navigator: NavigatorSettings::default(),
            resolver: ResolverSettings::default(),
        }
    }
}

pub struct JobSessionController {
    page: Arc<dyn BrowserPage>,
    completion: Arc<dyn CompletionService>,
    profile_builder: Arc<dyn ProfileBuilder>,
    sink: Arc<dyn ApplicationLogSink>,
    timing: Arc<TimingSimulator>,
    classifier: FieldClassifier,
    settings: SessionSettings,
    reporter: Arc<RunReporter>,
    stop: watch::Receiver<bool>,
}

impl JobSessionController {
    pub fn new(
        page: Arc<dyn BrowserPage>,
        completion: Arc<dyn CompletionService>,
        reporter: Arc<RunReporter>,
    ) -> Self {
        let (_, stop) = watch::channel(false);
        Self {
            page,
            profile_builder: Arc::new(LlmProfileBuilder::new(completion.clone())),
            completion,
            sink: Arc::new(LocalLogSink),
            timing: Arc::new(TimingSimulator::new(TimingProfile::default())),
            classifier: FieldClassifier::default(),
            settings: SessionSettings::default(),
            reporter,
            stop,
        }
    }

    pub fn with_profile_builder(mut self, builder: Arc<dyn ProfileBuilder>) -> Self {
        self.profile_builder = builder;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ApplicationLogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timing(mut self, timing: TimingSimulator) -> Self {
        self.timing = Arc::new(timing);
        self
    }

    pub fn with_classifier(mut self, classifier: FieldClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Stop requests are honored between jobs, never mid-form.
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = stop;
        self
    }

    pub async fn run(&self, config: &RunConfiguration) -> Result<RunSummary, RunAborted> {
        let started_at = Utc::now();
        let cap = config.max_applications;
        info!(cap, keyword = config.primary_keyword(), "Run started");

        let board = JobBoard::new(
            self.page.clone(),
            self.timing.clone(),
            self.settings.board.clone(),
        );

        self.reporter.emit(Stage::Login, "Signing in to the job board");
        if let Err(e) = board.login(&config.email, &config.password).await {
            let error = match e {
                BoardError::Checkpoint(url) => RunError::ManualInterventionRequired(url),
                other => RunError::Authentication(other.to_string()),
            };
            return Err(self.abort(error, Vec::new(), started_at, cap));
        }

        self.reporter.emit(Stage::Profile, "Reading resume");
        let profile = match self.build_profile(config).await {
            Ok(profile) => profile,
            Err(e) => return Err(self.abort(e.into(), Vec::new(), started_at, cap)),
        };
        self.reporter.emit(
            Stage::Profile,
            format!("Profile ready: {} facts found", profile.present_count()),
        );

        let resolver = FieldResolver::new(
            Arc::new(profile),
            self.completion.clone(),
            self.settings.resolver.clone(),
            Some(config.resume_path.clone()),
        );
        let navigator = FormNavigator::new(
            self.page.clone(),
            self.classifier.clone(),
            resolver,
            self.timing.clone(),
            self.settings.navigator.clone(),
        );

        let query = SearchQuery::from_config(config);
        self.reporter.emit(
            Stage::Search,
            format!("Searching for \"{}\" in {}", query.keyword, query.location),
        );
        let mut feed = board.feed(query);

        let mut outcomes: Vec<ApplicationOutcome> = Vec::new();
        let mut submitted = 0;
        let mut discovered = 0;
        let mut termination = None;
        let mut search_retried = false;

        while submitted < cap {
            if *self.stop.borrow() {
                self.reporter.emit(Stage::Stopped, "Stop requested, ending run");
                termination = Some(TerminationReason::StopRequested);
                break;
            }

            let mut listing = match feed.next().await {
                Ok(Some(listing)) => listing,
                Ok(None) if discovered == 0 => {
                    return Err(self.abort(RunError::NoResults, outcomes, started_at, cap));
                }
                Ok(None) => break,
                Err(BoardError::Checkpoint(url)) if discovered == 0 => {
                    let error = RunError::ManualInterventionRequired(url);
                    return Err(self.abort(error, outcomes, started_at, cap));
                }
                Err(BoardError::Checkpoint(url)) => {
                    self.reporter.emit(
                        Stage::ManualIntervention,
                        format!("Manual verification required at {url}; run paused"),
                    );
                    termination = Some(TerminationReason::ManualInterventionRequired);
                    break;
                }
                Err(e) if discovered == 0 => {
                    let error = RunError::Search(e.to_string());
                    return Err(self.abort(error, outcomes, started_at, cap));
                }
                Err(e) if !search_retried => {
                    warn!("Job search failed mid-run, rescanning from the first page: {e}");
                    search_retried = true;
                    feed.restart();
                    continue;
                }
                Err(e) => {
                    error!("Job search failed mid-run: {e}");
                    self.reporter
                        .emit(Stage::Error, format!("Job search failed: {e}"));
                    termination = Some(TerminationReason::SearchFailed);
                    break;
                }
            };
            discovered += 1;

            if let Err(e) = listing.advance(JobStatus::Applying) {
                warn!("{e}");
                continue;
            }
            self.reporter.emit_job(
                &listing,
                Stage::Applying,
                format!("Applying to {} at {}", listing.title, listing.company),
            );

            let outcome = match self.attempt(&navigator, &listing).await {
                Attempt::Finished(outcome) => outcome,
                Attempt::Checkpoint { url, outcome } => {
                    if let Some(outcome) = outcome {
                        self.record(&mut listing, &outcome);
                        self.log_outcome(&outcome).await;
                        outcomes.push(outcome);
                    }
                    self.reporter.emit_job(
                        &listing,
                        Stage::ManualIntervention,
                        format!("Manual verification required at {url}; run paused"),
                    );
                    termination = Some(TerminationReason::ManualInterventionRequired);
                    break;
                }
            };

            self.record(&mut listing, &outcome);
            if outcome.status == OutcomeStatus::Submitted {
                submitted += 1;
            }

            if submitted < cap {
                tokio::join!(self.log_outcome(&outcome), self.timing.pause(Interval::Job));
            } else {
                self.log_outcome(&outcome).await;
            }
            outcomes.push(outcome);
        }

        let summary = RunSummary::new(outcomes, started_at, cap, termination);
        info!(
            submitted = summary.counts.submitted,
            skipped = summary.counts.skipped,
            failed = summary.counts.failed,
            terminated_early = summary.terminated_early,
            "Run finished"
        );
        self.reporter.finish(summary.clone());
        Ok(summary)
    }

    async fn build_profile(
        &self,
        config: &RunConfiguration,
    ) -> Result<CandidateProfile, ProfileError> {
        let text = extract_resume_text(&config.resume_path).await?;
        self.profile_builder.build(&text).await
    }

    /// Runs the navigator for one job under the job timeout and folds every failure into
    /// an outcome. Checkpoints are handed back to the loop.
    async fn attempt(&self, navigator: &FormNavigator, listing: &JobListing) -> Attempt {
        let result = tokio::time::timeout(self.settings.job_timeout, navigator.apply(listing)).await;
        let failed = |reason| {
            ApplicationOutcome::new(
                listing,
                OutcomeStatus::Failed,
                Some(reason),
                ResolutionSummary::default(),
                0,
            )
        };

        match result {
            Ok(Ok(outcome)) => Attempt::Finished(outcome),
            Ok(Err(JobError::Checkpoint { url, form_started })) => Attempt::Checkpoint {
                url,
                outcome: form_started.then(|| failed(ReasonCode::ManualInterventionRequired)),
            },
            Ok(Err(e)) => {
                warn!(job_id = %listing.id, "Job failed: {e}");
                Attempt::Finished(failed(e.reason()))
            }
            Err(_) => {
                warn!(
                    job_id = %listing.id,
                    timeout_secs = self.settings.job_timeout.as_secs(),
                    "Job timed out"
                );
                navigator.abandon().await;
                Attempt::Finished(failed(ReasonCode::JobTimeout))
            }
        }
    }

    fn record(&self, listing: &mut JobListing, outcome: &ApplicationOutcome) {
        if let Err(e) = listing.advance(outcome.status.into()) {
            warn!("{e}");
        }
        self.reporter.record_outcome(outcome);
    }

    /// Sink failures are logged locally and never interrupt the run.
    async fn log_outcome(&self, outcome: &ApplicationOutcome) {
        if let Err(e) = self.sink.append(outcome).await {
            warn!(job_id = %outcome.job_id, "Application log sink unavailable: {e}");
            let _ = LocalLogSink.append(outcome).await;
        }
    }

    fn abort(
        &self,
        error: RunError,
        outcomes: Vec<ApplicationOutcome>,
        started_at: DateTime<Utc>,
        cap: u32,
    ) -> RunAborted {
        error!("Run aborted: {error}");
        let summary = RunSummary::new(outcomes, started_at, cap, Some(error.termination_reason()));
        self.reporter.fail(error.to_string(), Some(summary.clone()));
        RunAborted { error, summary }
    }
}

enum Attempt {
    Finished(ApplicationOutcome),
    Checkpoint {
        url: String,
        outcome: Option<ApplicationOutcome>,
    },
}
