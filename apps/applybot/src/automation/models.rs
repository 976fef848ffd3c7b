//! Core data model of the application engine: listings, field descriptors, outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Job listings
// ────────────────────────────────────────────────────────────────────────────

/// Processing status of a listing. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Applying,
    Submitted,
    Skipped,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Applying => 1,
            JobStatus::Submitted | JobStatus::Skipped | JobStatus::Failed => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("job {job_id}: status cannot move from {from:?} to {to:?}")]
pub struct StatusTransitionError {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub quick_apply: bool,
    status: JobStatus,
}

impl JobListing {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        url: impl Into<String>,
        quick_apply: bool,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            company: company.into(),
            url: url.into(),
            quick_apply,
            status: JobStatus::Pending,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Moves the listing strictly forward: pending → applying → one terminal status.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), StatusTransitionError> {
        if next.rank() <= self.status.rank() {
            return Err(StatusTransitionError {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Form fields
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Select,
    Radio,
    Checkbox,
    File,
    Textarea,
}

impl InputKind {
    pub fn is_choice(self) -> bool {
        matches!(self, InputKind::Select | InputKind::Radio | InputKind::Checkbox)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Select => "select",
            InputKind::Radio => "radio",
            InputKind::Checkbox => "checkbox",
            InputKind::File => "file",
            InputKind::Textarea => "textarea",
        }
    }
}

/// Semantic type assigned by the field classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Name,
    Email,
    Phone,
    ExperienceYears,
    Skill,
    Location,
    WorkAuthorization,
    /// Visa sponsorship questions. The polarity is the reverse of authorization, so these
    /// never resolve from the authorization fact.
    Sponsorship,
    Salary,
    CoverLetter,
    Unknown,
}

/// A form input as reported by the browser, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub label: String,
    pub kind: InputKind,
    pub required: bool,
    /// Ordered options for select/radio inputs; `["Yes", "No"]` for checkboxes.
    pub options: Vec<String>,
    /// Value already present (board-prefilled contact details, for instance).
    pub current_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormFieldDescriptor {
    pub label: String,
    pub kind: InputKind,
    pub required: bool,
    pub field_type: FieldType,
    pub options: Vec<String>,
}

impl FormFieldDescriptor {
    pub fn new(raw: &RawField, field_type: FieldType) -> Self {
        Self {
            label: raw.label.clone(),
            kind: raw.kind,
            required: raw.required,
            field_type,
            options: raw.options.clone(),
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.kind.is_choice() && !self.options.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Submitted,
    Skipped,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Submitted => "submitted",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
        }
    }
}

impl From<OutcomeStatus> for JobStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Submitted => JobStatus::Submitted,
            OutcomeStatus::Skipped => JobStatus::Skipped,
            OutcomeStatus::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    UnresolvableRequiredField,
    NonApplicable,
    StepLimitExceeded,
    RenderingFailure,
    JobTimeout,
    BrowserFailure,
    ManualInterventionRequired,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::UnresolvableRequiredField => "unresolvable-required-field",
            ReasonCode::NonApplicable => "non-applicable",
            ReasonCode::StepLimitExceeded => "step-limit-exceeded",
            ReasonCode::RenderingFailure => "rendering-failure",
            ReasonCode::JobTimeout => "job-timeout",
            ReasonCode::BrowserFailure => "browser-failure",
            ReasonCode::ManualInterventionRequired => "manual-intervention-required",
        }
    }
}

/// How the fields of one application were answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub deterministic: u32,
    pub ai: u32,
    pub blank: u32,
    /// AI calls that failed after their retry (timeouts, rate limits, service errors).
    pub ai_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationOutcome {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub status: OutcomeStatus,
    pub reason: Option<ReasonCode>,
    pub timestamp: DateTime<Utc>,
    pub resolution: ResolutionSummary,
    pub steps: u32,
}

impl ApplicationOutcome {
    pub fn new(
        listing: &JobListing,
        status: OutcomeStatus,
        reason: Option<ReasonCode>,
        resolution: ResolutionSummary,
        steps: u32,
    ) -> Self {
        Self {
            job_id: listing.id.clone(),
            title: listing.title.clone(),
            company: listing.company.clone(),
            status,
            reason,
            timestamp: Utc::now(),
            resolution,
            steps,
        }
    }

    pub fn submitted(listing: &JobListing, resolution: ResolutionSummary, steps: u32) -> Self {
        Self::new(listing, OutcomeStatus::Submitted, None, resolution, steps)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Run summary
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    ManualInterventionRequired,
    AuthenticationFailed,
    ProfileUnavailable,
    NoResults,
    SearchFailed,
    StopRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub submitted: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl OutcomeCounts {
    pub fn record(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Submitted => self.submitted += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
    }

    pub fn attempted(&self) -> u32 {
        self.submitted + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub counts: OutcomeCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub application_cap: u32,
    pub terminated_early: bool,
    pub termination_reason: Option<TerminationReason>,
    /// Every attempted job, in attempt order.
    pub outcomes: Vec<ApplicationOutcome>,
}

impl RunSummary {
    pub fn new(
        outcomes: Vec<ApplicationOutcome>,
        started_at: DateTime<Utc>,
        application_cap: u32,
        termination_reason: Option<TerminationReason>,
    ) -> Self {
        let mut counts = OutcomeCounts::default();
        for outcome in &outcomes {
            counts.record(outcome.status);
        }
        Self {
            counts,
            started_at,
            finished_at: Utc::now(),
            application_cap,
            terminated_early: termination_reason.is_some(),
            termination_reason,
            outcomes,
        }
    }
}
