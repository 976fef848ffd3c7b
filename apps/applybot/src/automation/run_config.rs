//! Run Configuration: validated, immutable inputs for one run.
//!
//! `RunConfigInput` is whatever the start-run request carried. `validate()` either
//! returns a complete `RunConfiguration` or every problem found, never a partial value.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Credential that must not leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    Contract,
    Temporary,
    Internship,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::FullTime,
        JobType::PartTime,
        JobType::Contract,
        JobType::Temporary,
        JobType::Internship,
    ];

    pub fn label(self) -> &'static str {
        match self {
            JobType::FullTime => "Full-time",
            JobType::PartTime => "Part-time",
            JobType::Contract => "Contract",
            JobType::Temporary => "Temporary",
            JobType::Internship => "Internship",
        }
    }

    /// Value of the board's `f_JT` search filter.
    pub fn search_code(self) -> &'static str {
        match self {
            JobType::FullTime => "F",
            JobType::PartTime => "P",
            JobType::Contract => "C",
            JobType::Temporary => "T",
            JobType::Internship => "I",
        }
    }

    fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkMode {
    #[serde(rename = "On-site")]
    OnSite,
    Remote,
    Hybrid,
}

impl WorkMode {
    pub const ALL: [WorkMode; 3] = [WorkMode::OnSite, WorkMode::Remote, WorkMode::Hybrid];

    pub fn label(self) -> &'static str {
        match self {
            WorkMode::OnSite => "On-site",
            WorkMode::Remote => "Remote",
            WorkMode::Hybrid => "Hybrid",
        }
    }

    /// Value of the board's `f_WT` search filter.
    pub fn search_code(self) -> &'static str {
        match self {
            WorkMode::OnSite => "1",
            WorkMode::Remote => "2",
            WorkMode::Hybrid => "3",
        }
    }

    fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl ConfigIssue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unvalidated start-run input, as received.
#[derive(Debug, Clone, Default)]
pub struct RunConfigInput {
    pub email: String,
    pub password: Option<Secret>,
    pub resume_path: Option<PathBuf>,
    pub keywords: String,
    pub location: String,
    pub job_types: Vec<String>,
    pub work_modes: Vec<String>,
    pub max_applications: String,
    pub sheet_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub email: String,
    pub password: Secret,
    pub resume_path: PathBuf,
    pub keywords: Vec<String>,
    pub location: String,
    pub job_types: Vec<JobType>,
    pub work_modes: Vec<WorkMode>,
    pub max_applications: u32,
    pub sheet_id: Option<String>,
}

impl RunConfiguration {
    /// The board searches one keyword at a time; the first one listed is used.
    pub fn primary_keyword(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or_default()
    }
}

impl RunConfigInput {
    pub fn validate(self) -> Result<RunConfiguration, Vec<ConfigIssue>> {
        let mut issues = Vec::new();

        let email = self.email.trim().to_string();
        if email.is_empty() {
            issues.push(ConfigIssue::new("linkedinEmail", "is required"));
        } else if !email.split_once('@').is_some_and(|(user, host)| {
            !user.is_empty() && host.contains('.')
        }) {
            issues.push(ConfigIssue::new("linkedinEmail", "is not an email address"));
        }

        let password = self.password.filter(|p| !p.expose().is_empty());
        if password.is_none() {
            issues.push(ConfigIssue::new("linkedinPassword", "is required"));
        }

        let resume_path = match self.resume_path {
            None => {
                issues.push(ConfigIssue::new("resume", "is required"));
                None
            }
            Some(path) if !path.is_file() => {
                issues.push(ConfigIssue::new(
                    "resume",
                    format!("{} does not exist", path.display()),
                ));
                None
            }
            Some(path) => {
                let supported = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf") || e.eq_ignore_ascii_case("txt"));
                if !supported {
                    issues.push(ConfigIssue::new("resume", "must be a PDF or plain-text file"));
                }
                Some(path)
            }
        };

        let keywords: Vec<String> = self
            .keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keywords.is_empty() {
            issues.push(ConfigIssue::new("jobKeywords", "at least one keyword is required"));
        }

        let location = self.location.trim().to_string();
        if location.is_empty() {
            issues.push(ConfigIssue::new("location", "is required"));
        }

        let job_types = parse_set(&self.job_types, JobType::parse, "jobTypes", &mut issues);
        let work_modes = parse_set(&self.work_modes, WorkMode::parse, "workMode", &mut issues);

        let max_applications = match self.max_applications.trim().parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                issues.push(ConfigIssue::new(
                    "maxApplications",
                    "must be a whole number greater than zero",
                ));
                0
            }
        };

        let sheet_id = self
            .sheet_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match (password, resume_path) {
            (Some(password), Some(resume_path)) if issues.is_empty() => Ok(RunConfiguration {
                email,
                password,
                resume_path,
                keywords,
                location,
                job_types,
                work_modes,
                max_applications,
                sheet_id,
            }),
            _ => Err(issues),
        }
    }
}

/// Parses a non-empty set of labels, dropping duplicates but keeping first-seen order.
fn parse_set<T: PartialEq>(
    labels: &[String],
    parse: fn(&str) -> Option<T>,
    field: &'static str,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<T> {
    let mut values = Vec::new();
    for label in labels {
        match parse(label) {
            Some(value) if !values.contains(&value) => values.push(value),
            Some(_) => {}
            None => issues.push(ConfigIssue::new(field, format!("unknown value '{label}'"))),
        }
    }
    if labels.is_empty() {
        issues.push(ConfigIssue::new(field, "select at least one"));
    }
    values
}
