//! In-memory fakes for engine tests: a scripted job board page, a scripted AI service,
//! a recording log sink and a fixed profile builder.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::automation::board::LOGIN_URL;
use crate::automation::browser::{BrowserError, BrowserPage, ElementHandle, SelectorIntent};
use crate::automation::models::{ApplicationOutcome, InputKind, JobListing, RawField};
use crate::automation::sink::{ApplicationLogSink, SinkError};
use crate::llm_client::{CompletionService, LlmError};
use crate::profile::extract::{ProfileBuilder, ProfileError};
use crate::profile::CandidateProfile;

const FEED_URL: &str = "https://www.linkedin.com/feed/";
const REJECTED_URL: &str = "https://www.linkedin.com/uas/login-submit";
const CHECKPOINT_URL: &str = "https://www.linkedin.com/checkpoint/challenge/AgEfake";
const HANG: Duration = Duration::from_secs(3600);

pub fn text_field(label: &str, required: bool) -> RawField {
    RawField {
        label: label.to_string(),
        kind: InputKind::Text,
        required,
        options: vec![],
        current_value: None,
    }
}

pub fn choice_field(label: &str, kind: InputKind, options: &[&str]) -> RawField {
    RawField {
        label: label.to_string(),
        kind,
        required: true,
        options: options.iter().map(|o| o.to_string()).collect(),
        current_value: None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted job board
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginBehavior {
    #[default]
    Succeeds,
    Rejected,
    Checkpoint,
}

/// One listing on the fake board and the modal behind it.
#[derive(Debug, Clone)]
pub struct FakeJob {
    pub id: String,
    pub title: String,
    pub company: String,
    quick_apply: bool,
    steps: Vec<Vec<RawField>>,
    already_applied: bool,
    checkpoint_on_open: bool,
    checkpoint_at_step: Option<usize>,
    looping: bool,
    render_failures: u32,
    hangs: bool,
    broken: bool,
}

impl FakeJob {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: format!("Engineer {id}"),
            company: format!("Company {id}"),
            id,
            quick_apply: true,
            steps: Vec::new(),
            already_applied: false,
            checkpoint_on_open: false,
            checkpoint_at_step: None,
            looping: false,
            render_failures: 0,
            hangs: false,
            broken: false,
        }
    }

    pub fn step(mut self, fields: Vec<RawField>) -> Self {
        self.steps.push(fields);
        self
    }

    pub fn without_quick_apply(mut self) -> Self {
        self.quick_apply = false;
        self
    }

    pub fn already_applied(mut self) -> Self {
        self.already_applied = true;
        self
    }

    pub fn checkpoint_on_open(mut self) -> Self {
        self.checkpoint_on_open = true;
        self
    }

    /// Verification gate appears when the zero-based `step` is reached.
    pub fn checkpoint_at_step(mut self, step: usize) -> Self {
        self.checkpoint_at_step = Some(step);
        self
    }

    /// The modal offers "Next" forever.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// The field list is stale for the first `n` reads.
    pub fn render_failures(mut self, n: u32) -> Self {
        self.render_failures = n;
        self
    }

    /// Opening the job page never finishes.
    pub fn hangs(mut self) -> Self {
        self.hangs = true;
        self
    }

    /// The driver errors out on this job page.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn url(&self) -> String {
        format!("https://www.linkedin.com/jobs/view/{}/", self.id)
    }

    pub fn listing(&self) -> JobListing {
        JobListing::new(
            self.id.clone(),
            self.title.clone(),
            self.company.clone(),
            self.url(),
            self.quick_apply,
        )
    }

    fn is_last_step(&self, step: usize) -> bool {
        !self.looping && step + 1 >= self.steps.len().max(1)
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    login: LoginBehavior,
    login_attempts: u32,
    search_pages: Vec<Vec<FakeJob>>,
    search_pages_loaded: u32,
    search_checkpoint: Option<usize>,
    current_search: Option<usize>,
    jobs: HashMap<String, FakeJob>,
    current_job: Option<String>,
    modal_open: bool,
    discard_prompt: bool,
    confirmed: bool,
    step: usize,
    render_failures_left: u32,
    fields: HashMap<String, RawField>,
    typed: HashMap<String, Vec<String>>,
    chosen: HashMap<String, String>,
    checked: HashMap<String, bool>,
    files: HashMap<String, PathBuf>,
    submitted: Vec<String>,
    discarded: Vec<String>,
    opened: Vec<String>,
    scrolls: u32,
}

impl PageState {
    fn job(&self) -> Option<&FakeJob> {
        self.current_job.as_ref().and_then(|id| self.jobs.get(id))
    }

    fn current_job_id(&self) -> String {
        self.current_job.clone().unwrap_or_default()
    }

    fn register(&mut self, jobs: &[FakeJob]) {
        for job in jobs {
            self.jobs.insert(job.id.clone(), job.clone());
        }
    }
}

/// Scripted stand-in for a browser tab on the job board.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    /// All jobs listed on a single results page.
    pub fn with_jobs(jobs: Vec<FakeJob>) -> Self {
        Self::with_search_pages(vec![jobs])
    }

    pub fn with_search_pages(pages: Vec<Vec<FakeJob>>) -> Self {
        let page = Self::default();
        {
            let mut st = page.state.lock().unwrap();
            for jobs in &pages {
                st.register(jobs);
            }
            st.search_pages = pages;
        }
        page
    }

    /// Loading results page `index` (zero-based) redirects to a verification gate.
    pub fn with_search_checkpoint(self, index: usize) -> Self {
        self.state.lock().unwrap().search_checkpoint = Some(index);
        self
    }

    pub fn with_login(self, behavior: LoginBehavior) -> Self {
        self.state.lock().unwrap().login = behavior;
        self
    }

    pub fn typed_into(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .typed
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// What was entered into field `index` of zero-based `step` of a job's modal.
    pub fn entered_value(&self, job_id: &str, step: usize, index: usize) -> Option<String> {
        let st = self.state.lock().unwrap();
        let id = format!("field-{job_id}-{step}-{index}");
        if let Some(typed) = st.typed.get(&id).filter(|t| !t.is_empty()) {
            return Some(typed.concat());
        }
        if let Some(chosen) = st.chosen.get(&id) {
            return Some(chosen.clone());
        }
        if let Some(checked) = st.checked.get(&id) {
            return Some((if *checked { "Yes" } else { "No" }).to_string());
        }
        st.files.get(&id).map(|p| p.display().to_string())
    }

    pub fn login_attempts(&self) -> u32 {
        self.state.lock().unwrap().login_attempts
    }

    pub fn scrolls(&self) -> u32 {
        self.state.lock().unwrap().scrolls
    }

    pub fn search_pages_loaded(&self) -> u32 {
        self.state.lock().unwrap().search_pages_loaded
    }

    pub fn submitted_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn discarded_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().discarded.clone()
    }

    pub fn opened_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }
}

fn card_parts(id: &str) -> Option<(&str, Option<&str>)> {
    let rest = id.strip_prefix("card-")?;
    Some(match rest.split_once('-') {
        Some((job, part)) => (job, Some(part)),
        None => (rest, None),
    })
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let hang = {
            let mut st = self.state.lock().unwrap();
            st.url = url.to_string();
            st.modal_open = false;
            st.discard_prompt = false;
            st.confirmed = false;
            st.current_search = None;
            st.current_job = None;

            if url.contains("/jobs/search") {
                let start = url
                    .split("start=")
                    .nth(1)
                    .and_then(|s| s.split('&').next())
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                st.search_pages_loaded += 1;
                if st.search_checkpoint == Some(start / 25) {
                    st.url = CHECKPOINT_URL.to_string();
                } else {
                    st.current_search = Some(start / 25);
                }
                false
            } else if let Some(rest) = url.split("/jobs/view/").nth(1) {
                let id = rest.trim_end_matches('/').to_string();
                let job = st.jobs.get(&id).cloned();
                st.opened.push(id.clone());
                st.current_job = Some(id);
                st.step = 0;
                match job {
                    Some(job) => {
                        st.render_failures_left = job.render_failures;
                        if job.checkpoint_on_open {
                            st.url = CHECKPOINT_URL.to_string();
                        }
                        job.hangs
                    }
                    None => false,
                }
            } else {
                false
            }
        };
        if hang {
            tokio::time::sleep(HANG).await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn locate(&self, intent: SelectorIntent) -> Result<Option<ElementHandle>, BrowserError> {
        let st = self.state.lock().unwrap();
        let on_login = st.url.starts_with(LOGIN_URL);
        let job = st.job();
        let step = st.step;

        if intent == SelectorIntent::QuickApplyButton && job.is_some_and(|j| j.broken) {
            return Err(BrowserError::Driver("tab crashed".to_string()));
        }

        let found = match intent {
            SelectorIntent::LoginUsername => on_login.then_some("login-username"),
            SelectorIntent::LoginPassword => on_login.then_some("login-password"),
            SelectorIntent::LoginSubmit => on_login.then_some("login-submit"),
            SelectorIntent::QuickApplyButton => job
                .filter(|j| j.quick_apply && !j.already_applied && !st.modal_open)
                .map(|_| "apply-button"),
            SelectorIntent::AlreadyAppliedNotice => job
                .filter(|j| j.already_applied)
                .map(|_| "already-applied"),
            SelectorIntent::ApplyModal => st.modal_open.then_some("modal"),
            SelectorIntent::NextButton => job
                .filter(|j| st.modal_open && !j.is_last_step(step))
                .map(|_| "next"),
            SelectorIntent::SubmitButton => job
                .filter(|j| st.modal_open && j.is_last_step(step))
                .map(|_| "submit"),
            SelectorIntent::SubmissionConfirmation => st.confirmed.then_some("confirmation"),
            SelectorIntent::ModalDismiss => st.modal_open.then_some("modal-dismiss"),
            SelectorIntent::DiscardConfirm => st.discard_prompt.then_some("discard-confirm"),
            _ => None,
        };
        Ok(found.map(ElementHandle::new))
    }

    async fn locate_all(&self, intent: SelectorIntent) -> Result<Vec<ElementHandle>, BrowserError> {
        let mut st = self.state.lock().unwrap();
        match intent {
            SelectorIntent::JobCard => {
                let cards: Vec<ElementHandle> = st
                    .current_search
                    .and_then(|page| st.search_pages.get(page))
                    .map(|jobs| {
                        jobs.iter()
                            .map(|j| ElementHandle::new(format!("card-{}", j.id)))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(cards)
            }
            SelectorIntent::ModalField => {
                if !st.modal_open {
                    return Ok(vec![]);
                }
                if st.render_failures_left > 0 {
                    st.render_failures_left -= 1;
                    return Err(BrowserError::Stale("apply modal".to_string()));
                }
                let job_id = st.current_job_id();
                let step = st.step;
                let fields = st
                    .job()
                    .and_then(|j| j.steps.get(step).or(j.steps.last()))
                    .cloned()
                    .unwrap_or_default();
                let mut handles = Vec::new();
                for (i, field) in fields.into_iter().enumerate() {
                    let id = format!("field-{job_id}-{step}-{i}");
                    st.fields.insert(id.clone(), field);
                    handles.push(ElementHandle::new(id));
                }
                Ok(handles)
            }
            _ => Ok(vec![]),
        }
    }

    async fn locate_within(
        &self,
        parent: &ElementHandle,
        intent: SelectorIntent,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        let st = self.state.lock().unwrap();
        let Some((job_id, None)) = card_parts(parent.id()) else {
            return Ok(None);
        };
        let Some(job) = st.jobs.get(job_id) else {
            return Err(BrowserError::Stale(parent.id().to_string()));
        };
        let part = match intent {
            SelectorIntent::JobCardTitle => Some("title"),
            SelectorIntent::JobCardCompany => Some("company"),
            SelectorIntent::JobCardLink => Some("link"),
            SelectorIntent::QuickApplyBadge => job.quick_apply.then_some("badge"),
            _ => None,
        };
        Ok(part.map(|p| ElementHandle::new(format!("card-{job_id}-{p}"))))
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let st = self.state.lock().unwrap();
        let text = match card_parts(element.id()) {
            Some((job_id, Some(part))) => st.jobs.get(job_id).map(|job| match part {
                "title" => job.title.clone(),
                "company" => job.company.clone(),
                _ => String::new(),
            }),
            _ => None,
        };
        Ok(text.unwrap_or_default())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        match card_parts(element.id()) {
            Some((job_id, Some("link"))) if name == "href" => {
                Ok(Some(format!("/jobs/view/{job_id}/?refId=fake")))
            }
            _ => Ok(None),
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        let mut st = self.state.lock().unwrap();
        match element.id() {
            "login-submit" => {
                st.login_attempts += 1;
                st.url = match st.login {
                    LoginBehavior::Succeeds => FEED_URL,
                    LoginBehavior::Rejected => REJECTED_URL,
                    LoginBehavior::Checkpoint => CHECKPOINT_URL,
                }
                .to_string();
            }
            "apply-button" => {
                st.modal_open = true;
                st.step = 0;
            }
            "next" => {
                st.step += 1;
                let step = st.step;
                if st.job().and_then(|j| j.checkpoint_at_step) == Some(step) {
                    st.url = CHECKPOINT_URL.to_string();
                }
            }
            "submit" => {
                let id = st.current_job_id();
                st.submitted.push(id);
                st.modal_open = false;
                st.confirmed = true;
            }
            "modal-dismiss" => {
                st.modal_open = false;
                st.discard_prompt = true;
            }
            "discard-confirm" => {
                let id = st.current_job_id();
                st.discarded.push(id);
                st.discard_prompt = false;
            }
            _ => {}
        }
        Ok(())
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<(), BrowserError> {
        self.state.lock().unwrap().scrolls += 1;
        Ok(())
    }

    async fn describe_field(&self, field: &ElementHandle) -> Result<RawField, BrowserError> {
        self.state
            .lock()
            .unwrap()
            .fields
            .get(field.id())
            .cloned()
            .ok_or_else(|| BrowserError::Stale(field.id().to_string()))
    }

    async fn clear_field(&self, field: &ElementHandle) -> Result<(), BrowserError> {
        self.state.lock().unwrap().typed.remove(field.id());
        Ok(())
    }

    async fn type_text(&self, field: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.state
            .lock()
            .unwrap()
            .typed
            .entry(field.id().to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    async fn choose_option(
        &self,
        field: &ElementHandle,
        option: &str,
    ) -> Result<(), BrowserError> {
        let mut st = self.state.lock().unwrap();
        let offered = st
            .fields
            .get(field.id())
            .map_or(true, |f| f.options.iter().any(|o| o == option));
        if !offered {
            return Err(BrowserError::NotInteractable {
                element: field.id().to_string(),
                action: format!("option '{option}'"),
            });
        }
        st.chosen.insert(field.id().to_string(), option.to_string());
        Ok(())
    }

    async fn set_checked(&self, field: &ElementHandle, checked: bool) -> Result<(), BrowserError> {
        self.state
            .lock()
            .unwrap()
            .checked
            .insert(field.id().to_string(), checked);
        Ok(())
    }

    async fn attach_file(&self, field: &ElementHandle, path: &Path) -> Result<(), BrowserError> {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(field.id().to_string(), path.to_path_buf());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted AI service
// ────────────────────────────────────────────────────────────────────────────

/// Replays queued responses; once the queue is empty every call answers `null`.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    hang: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Every call outlives any reasonable timeout.
    pub fn always_timeout() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.hang {
            tokio::time::sleep(HANG).await;
            return Err(LlmError::Timeout(HANG.as_millis() as u64));
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(r#"{"answer": null}"#.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sink and profile
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<ApplicationOutcome>>,
    unavailable: bool,
}

impl MemorySink {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<ApplicationOutcome> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApplicationLogSink for MemorySink {
    async fn append(&self, outcome: &ApplicationOutcome) -> Result<(), SinkError> {
        if self.unavailable {
            return Err(SinkError::Api {
                status: 503,
                message: "sheet unavailable".to_string(),
            });
        }
        self.rows.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}

/// Returns the same profile regardless of resume text.
pub struct StaticProfile(pub CandidateProfile);

#[async_trait]
impl ProfileBuilder for StaticProfile {
    async fn build(&self, _resume_text: &str) -> Result<CandidateProfile, ProfileError> {
        Ok(self.0.clone())
    }
}
