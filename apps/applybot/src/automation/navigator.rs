//! Form Navigator: drives one quick-apply modal from open to a terminal state.
//!
//! State machine:
//!
//! ```text
//! Opened → StepLoaded → FieldsResolved → Advanced ─┬→ StepLoaded (next step)
//!                │                                 ├→ Submitted
//!                └→ Blocked (required field absent)└→ Aborted (interstitial / step ceiling)
//! ```
//!
//! `Submitted` is the only success. A step that fails to render gets one retry; nothing
//! else is retried. A verification checkpoint is surfaced as `JobError::Checkpoint` so the
//! controller can pause the whole run.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::automation::browser::{
    checkpoint_url, click_humanized, type_humanized, wait_for, BrowserError, BrowserPage,
    ElementHandle, SelectorIntent,
};
use crate::automation::classifier::FieldClassifier;
use crate::automation::models::{
    ApplicationOutcome, FormFieldDescriptor, InputKind, JobListing, OutcomeStatus, ReasonCode,
    ResolutionSummary,
};
use crate::automation::resolver::{FieldResolver, ResolutionSource};
use crate::automation::timing::{Interval, TimingSimulator};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("manual verification required at {url}")]
    Checkpoint { url: String, form_started: bool },

    #[error("browser failure: {0}")]
    Browser(#[from] BrowserError),

    #[error("step {step} did not render: {detail}")]
    Rendering { step: u32, detail: String },
}

impl JobError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            JobError::Checkpoint { .. } => ReasonCode::ManualInterventionRequired,
            JobError::Browser(_) => ReasonCode::BrowserFailure,
            JobError::Rendering { .. } => ReasonCode::RenderingFailure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigatorSettings {
    pub max_steps: u32,
    pub step_timeout: Duration,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavState {
    Opened,
    StepLoaded(u32),
    FieldsResolved(u32),
    Advanced(u32),
    Done(Terminal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Submitted,
    Blocked(ReasonCode),
    Aborted(ReasonCode),
}

enum StepView {
    Fields(Vec<ElementHandle>),
    Interstitial,
}

/// Per-attempt bookkeeping threaded through the state machine.
#[derive(Default)]
struct Attempt {
    resolution: ResolutionSummary,
    steps: u32,
    modal_opened: bool,
}

pub struct FormNavigator {
    page: Arc<dyn BrowserPage>,
    classifier: FieldClassifier,
    resolver: FieldResolver,
    timing: Arc<TimingSimulator>,
    settings: NavigatorSettings,
}

impl FormNavigator {
    pub fn new(
        page: Arc<dyn BrowserPage>,
        classifier: FieldClassifier,
        resolver: FieldResolver,
        timing: Arc<TimingSimulator>,
        settings: NavigatorSettings,
    ) -> Self {
        Self {
            page,
            classifier,
            resolver,
            timing,
            settings,
        }
    }

    /// Applies to one listing. Never retries the job; returns the terminal outcome or the
    /// failure that stopped it.
    pub async fn apply(&self, job: &JobListing) -> Result<ApplicationOutcome, JobError> {
        let mut attempt = Attempt::default();

        let terminal = match self.drive(job, &mut attempt).await {
            Ok(terminal) => terminal,
            Err(e) => {
                if attempt.modal_opened && !matches!(e, JobError::Checkpoint { .. }) {
                    self.abandon().await;
                }
                return Err(e);
            }
        };

        let outcome = match terminal {
            Terminal::Submitted => {
                ApplicationOutcome::submitted(job, attempt.resolution, attempt.steps)
            }
            Terminal::Blocked(reason) | Terminal::Aborted(reason) => {
                if attempt.modal_opened {
                    self.abandon().await;
                }
                let status = match reason {
                    ReasonCode::UnresolvableRequiredField | ReasonCode::NonApplicable => {
                        OutcomeStatus::Skipped
                    }
                    _ => OutcomeStatus::Failed,
                };
                ApplicationOutcome::new(
                    job,
                    status,
                    Some(reason),
                    attempt.resolution,
                    attempt.steps,
                )
            }
        };

        info!(
            job_id = %job.id,
            status = ?outcome.status,
            reason = outcome.reason.map(ReasonCode::as_str),
            steps = outcome.steps,
            "Application finished"
        );
        Ok(outcome)
    }

    /// Closes the modal and confirms the discard prompt, if any. Best effort.
    pub async fn abandon(&self) {
        let dismiss = match self.page.locate(SelectorIntent::ModalDismiss).await {
            Ok(Some(dismiss)) => dismiss,
            Ok(None) => return,
            Err(e) => {
                debug!("Could not look for modal dismiss button: {e}");
                return;
            }
        };
        if let Err(e) = self.page.click(&dismiss).await {
            debug!("Could not dismiss modal: {e}");
            return;
        }
        self.timing.pause(Interval::Field).await;
        if let Ok(Some(confirm)) = self.page.locate(SelectorIntent::DiscardConfirm).await {
            if let Err(e) = self.page.click(&confirm).await {
                debug!("Could not confirm discard: {e}");
            }
        }
    }

    async fn drive(&self, job: &JobListing, attempt: &mut Attempt) -> Result<Terminal, JobError> {
        self.page.goto(&job.url).await?;
        self.timing.pause(Interval::Step).await;

        self.check_checkpoint(attempt).await?;
        if self.interstitial_present().await? {
            return Ok(Terminal::Aborted(ReasonCode::NonApplicable));
        }
        let Some(button) = self.page.locate(SelectorIntent::QuickApplyButton).await? else {
            info!(job_id = %job.id, "No quick apply button on job page");
            return Ok(Terminal::Aborted(ReasonCode::NonApplicable));
        };
        click_humanized(self.page.as_ref(), &button, &self.timing).await?;
        attempt.modal_opened = true;

        let mut state = NavState::Opened;
        let mut fields = Vec::new();
        loop {
            state = match state {
                NavState::Opened | NavState::Advanced(_) => {
                    let step = attempt.steps + 1;
                    if step > self.settings.max_steps {
                        warn!(job_id = %job.id, step, "Step ceiling reached");
                        NavState::Done(Terminal::Aborted(ReasonCode::StepLimitExceeded))
                    } else {
                        attempt.steps = step;
                        match self.load_step(step, attempt).await? {
                            StepView::Fields(loaded) => {
                                fields = loaded;
                                NavState::StepLoaded(step)
                            }
                            StepView::Interstitial => {
                                NavState::Done(Terminal::Aborted(ReasonCode::NonApplicable))
                            }
                        }
                    }
                }
                NavState::StepLoaded(step) => {
                    if self.fill_step(job, step, &fields, attempt).await? {
                        NavState::FieldsResolved(step)
                    } else {
                        NavState::Done(Terminal::Blocked(ReasonCode::UnresolvableRequiredField))
                    }
                }
                NavState::FieldsResolved(step) => self.advance(step).await?,
                NavState::Done(terminal) => return Ok(terminal),
            };
        }
    }

    /// Waits for the modal step and lists its fields, retrying once on a render race.
    async fn load_step(&self, step: u32, attempt: &Attempt) -> Result<StepView, JobError> {
        let mut last_problem = String::from("apply modal did not appear");

        for retry in 0..2 {
            if retry > 0 {
                warn!(step, "Step did not render ({last_problem}), retrying once");
                self.timing.pause(Interval::Step).await;
            }

            self.check_checkpoint(attempt).await?;
            if self.interstitial_present().await? {
                return Ok(StepView::Interstitial);
            }

            let modal = wait_for(
                self.page.as_ref(),
                SelectorIntent::ApplyModal,
                self.settings.step_timeout,
            )
            .await;
            match modal {
                Ok(Some(_)) => {}
                Ok(None) => {
                    last_problem = "apply modal did not appear".to_string();
                    continue;
                }
                Err(e) if e.is_transient() => {
                    last_problem = e.to_string();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            match self.page.locate_all(SelectorIntent::ModalField).await {
                Ok(fields) => {
                    debug!(step, fields = fields.len(), "Step loaded");
                    return Ok(StepView::Fields(fields));
                }
                Err(e) if e.is_transient() => last_problem = e.to_string(),
                Err(e) => return Err(e.into()),
            }
        }

        Err(JobError::Rendering {
            step,
            detail: last_problem,
        })
    }

    /// Resolves and enters every field of the step. `false` when a required field has
    /// no answer: the caller blocks rather than submit a guess.
    async fn fill_step(
        &self,
        job: &JobListing,
        step: u32,
        fields: &[ElementHandle],
        attempt: &mut Attempt,
    ) -> Result<bool, JobError> {
        for handle in fields {
            let raw = self.page.describe_field(handle).await?;

            let prefilled = raw
                .current_value
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty());
            if prefilled && raw.kind != InputKind::File {
                attempt.resolution.deterministic += 1;
                continue;
            }

            let descriptor = FormFieldDescriptor::new(&raw, self.classifier.classify(&raw));
            let (resolution, ()) = tokio::join!(
                self.resolver.resolve(&descriptor, job),
                self.timing.pause(Interval::Field)
            );

            match resolution.source {
                ResolutionSource::Deterministic => attempt.resolution.deterministic += 1,
                ResolutionSource::Ai => attempt.resolution.ai += 1,
                ResolutionSource::Absent => attempt.resolution.blank += 1,
            }
            if resolution.ai_failed {
                attempt.resolution.ai_failures += 1;
            }

            match resolution.value {
                Some(value) => self.enter(handle, &descriptor, &value).await?,
                None if descriptor.required => {
                    info!(
                        job_id = %job.id,
                        step,
                        label = %descriptor.label,
                        field_type = ?descriptor.field_type,
                        "Required field unresolved, skipping job"
                    );
                    return Ok(false);
                }
                None => debug!(label = %descriptor.label, "Optional field left blank"),
            }
        }
        Ok(true)
    }

    async fn enter(
        &self,
        handle: &ElementHandle,
        field: &FormFieldDescriptor,
        value: &str,
    ) -> Result<(), BrowserError> {
        match field.kind {
            InputKind::Text | InputKind::Textarea => {
                self.page.clear_field(handle).await?;
                type_humanized(self.page.as_ref(), handle, value, &self.timing).await
            }
            InputKind::Select | InputKind::Radio => self.page.choose_option(handle, value).await,
            InputKind::Checkbox => {
                let checked = matches!(
                    value.trim().to_lowercase().as_str(),
                    "yes" | "true" | "checked"
                );
                self.page.set_checked(handle, checked).await
            }
            InputKind::File => self.page.attach_file(handle, Path::new(value)).await,
        }
    }

    /// Submit when offered, otherwise Review/Next.
    async fn advance(&self, step: u32) -> Result<NavState, JobError> {
        self.timing.pause(Interval::Step).await;

        if let Some(submit) = self.page.locate(SelectorIntent::SubmitButton).await? {
            click_humanized(self.page.as_ref(), &submit, &self.timing).await?;
            let confirmation = wait_for(
                self.page.as_ref(),
                SelectorIntent::SubmissionConfirmation,
                self.settings.step_timeout,
            )
            .await?;
            if confirmation.is_some() || self.page.locate(SelectorIntent::ApplyModal).await?.is_none()
            {
                return Ok(NavState::Done(Terminal::Submitted));
            }
            return Err(JobError::Rendering {
                step,
                detail: "submission was not confirmed".to_string(),
            });
        }

        for intent in [SelectorIntent::ReviewButton, SelectorIntent::NextButton] {
            if let Some(button) = self.page.locate(intent).await? {
                click_humanized(self.page.as_ref(), &button, &self.timing).await?;
                return Ok(NavState::Advanced(step));
            }
        }

        Err(JobError::Rendering {
            step,
            detail: "no next, review or submit button".to_string(),
        })
    }

    async fn check_checkpoint(&self, attempt: &Attempt) -> Result<(), JobError> {
        match checkpoint_url(self.page.as_ref()).await? {
            Some(url) => {
                warn!(%url, "Verification checkpoint detected");
                Err(JobError::Checkpoint {
                    url,
                    form_started: attempt.modal_opened,
                })
            }
            None => Ok(()),
        }
    }

    async fn interstitial_present(&self) -> Result<bool, BrowserError> {
        for intent in [SelectorIntent::AlreadyAppliedNotice, SelectorIntent::PremiumUpsell] {
            if self.page.locate(intent).await?.is_some() {
                info!(?intent, "Non-form interstitial detected");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::resolver::ResolverSettings;
    use crate::automation::testing::{
        choice_field, text_field, FakeJob, FakePage, ScriptedCompletion,
    };
    use crate::llm_client::CompletionService;
    use crate::profile::{CandidateProfile, ProfileDraft};

    fn profile(phone: Option<&str>) -> Arc<CandidateProfile> {
        Arc::new(CandidateProfile::from(ProfileDraft {
            full_name: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            phone: phone.map(str::to_string),
            years_of_experience: Some(6),
            work_authorization: Some(true),
            ..ProfileDraft::default()
        }))
    }

    fn navigator(
        page: Arc<FakePage>,
        profile: Arc<CandidateProfile>,
        completion: Arc<dyn CompletionService>,
        max_steps: u32,
    ) -> FormNavigator {
        let resolver = FieldResolver::new(
            profile,
            completion,
            ResolverSettings {
                ai_timeout: Duration::from_millis(20),
                retry_backoff: Duration::from_millis(1),
                ..ResolverSettings::default()
            },
            None,
        );
        FormNavigator::new(
            page,
            FieldClassifier::default(),
            resolver,
            Arc::new(TimingSimulator::instant()),
            NavigatorSettings {
                max_steps,
                step_timeout: Duration::from_millis(50),
            },
        )
    }

    #[tokio::test]
    async fn test_multi_step_form_is_submitted() {
        let job = FakeJob::new("100")
            .step(vec![
                text_field("Full name", true),
                text_field("Mobile phone number", true),
            ])
            .step(vec![choice_field(
                "Are you legally authorized to work in the US?",
                InputKind::Radio,
                &["Yes", "No"],
            )]);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(Some("555 010 0100")),
            Arc::new(ScriptedCompletion::always_timeout()),
            10,
        );

        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Submitted);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.resolution.deterministic, 3);
        assert_eq!(outcome.resolution.ai, 0);
        assert_eq!(page.entered_value("100", 0, 0).as_deref(), Some("Ada Lovelace"));
        assert_eq!(page.entered_value("100", 1, 0).as_deref(), Some("Yes"));
        assert_eq!(page.submitted_jobs(), vec!["100".to_string()]);
    }

    #[tokio::test]
    async fn test_required_field_without_answer_skips_job() {
        let job = FakeJob::new("200").step(vec![text_field("Mobile Number", true)]);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let completion = Arc::new(ScriptedCompletion::with_responses(vec![Ok(
            r#"{"answer": ""}"#.to_string(),
        )]));
        let nav = navigator(page.clone(), profile(None), completion.clone(), 10);

        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason, Some(ReasonCode::UnresolvableRequiredField));
        assert_eq!(outcome.resolution.blank, 1);
        assert_eq!(completion.calls(), 1);
        assert!(page.submitted_jobs().is_empty());
        assert_eq!(page.discarded_jobs(), vec!["200".to_string()]);
    }

    #[tokio::test]
    async fn test_optional_field_left_blank_still_submits() {
        let job = FakeJob::new("250").step(vec![
            text_field("Full name", true),
            text_field("Personal website", false),
        ]);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let completion = Arc::new(ScriptedCompletion::with_responses(vec![Ok(
            r#"{"answer": null}"#.to_string(),
        )]));
        let nav = navigator(page.clone(), profile(None), completion, 10);

        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Submitted);
        assert_eq!(outcome.resolution.blank, 1);
    }

    #[tokio::test]
    async fn test_already_applied_notice_is_non_applicable() {
        let job = FakeJob::new("300").already_applied();
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            10,
        );

        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason, Some(ReasonCode::NonApplicable));
        assert_eq!(outcome.steps, 0);
    }

    #[tokio::test]
    async fn test_looping_modal_hits_step_ceiling() {
        let job = FakeJob::new("400")
            .step(vec![text_field("Full name", true)])
            .looping();
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            3,
        );

        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.reason, Some(ReasonCode::StepLimitExceeded));
        assert_eq!(outcome.steps, 3);
        assert_eq!(page.discarded_jobs(), vec!["400".to_string()]);
    }

    #[tokio::test]
    async fn test_render_failure_is_retried_once() {
        let job = FakeJob::new("500")
            .step(vec![text_field("Full name", true)])
            .render_failures(1);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            10,
        );
        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Submitted);
    }

    #[tokio::test]
    async fn test_persistent_render_failure_is_job_error() {
        let job = FakeJob::new("600")
            .step(vec![text_field("Full name", true)])
            .render_failures(2);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            10,
        );
        let err = nav.apply(&job.listing()).await.unwrap_err();
        assert!(matches!(err, JobError::Rendering { step: 1, .. }));
        assert_eq!(err.reason(), ReasonCode::RenderingFailure);
    }

    #[tokio::test]
    async fn test_checkpoint_on_open_is_surfaced() {
        let job = FakeJob::new("700")
            .step(vec![text_field("Full name", true)])
            .checkpoint_on_open();
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            10,
        );
        let err = nav.apply(&job.listing()).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::Checkpoint {
                form_started: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prefilled_fields_are_kept() {
        let mut email = text_field("Email address", true);
        email.current_value = Some("board@example.com".to_string());
        let job = FakeJob::new("800").step(vec![email]);
        let page = Arc::new(FakePage::with_jobs(vec![job.clone()]));
        let nav = navigator(
            page.clone(),
            profile(None),
            Arc::new(ScriptedCompletion::default()),
            10,
        );
        let outcome = nav.apply(&job.listing()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Submitted);
        assert_eq!(page.entered_value("800", 0, 0), None);
    }
}
