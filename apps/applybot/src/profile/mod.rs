//! Candidate Profile: normalized resume facts, built once per run and read-only afterwards.
//!
//! Every fact is optional. A fact the resume does not state stays `None`; nothing
//! downstream is allowed to guess it.

pub mod extract;
pub mod prompts;

use serde::{Deserialize, Serialize};

/// Canonical fact keys. The field resolver maps field types onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKey {
    FullName,
    Email,
    Phone,
    Location,
    YearsOfExperience,
    Skills,
    Education,
    WorkAuthorization,
    SalaryExpectation,
    CoverLetter,
}

impl ProfileKey {
    pub const ALL: [ProfileKey; 10] = [
        ProfileKey::FullName,
        ProfileKey::Email,
        ProfileKey::Phone,
        ProfileKey::Location,
        ProfileKey::YearsOfExperience,
        ProfileKey::Skills,
        ProfileKey::Education,
        ProfileKey::WorkAuthorization,
        ProfileKey::SalaryExpectation,
        ProfileKey::CoverLetter,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProfileKey::FullName => "full name",
            ProfileKey::Email => "email",
            ProfileKey::Phone => "phone",
            ProfileKey::Location => "location",
            ProfileKey::YearsOfExperience => "years of experience",
            ProfileKey::Skills => "skills",
            ProfileKey::Education => "education",
            ProfileKey::WorkAuthorization => "authorized to work",
            ProfileKey::SalaryExpectation => "salary expectation",
            ProfileKey::CoverLetter => "cover letter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: Option<String>,
    pub year: Option<String>,
}

impl EducationEntry {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(degree) = &self.degree {
            parts.push(degree.clone());
        }
        parts.push(self.institution.clone());
        if let Some(year) = &self.year {
            parts.push(year.clone());
        }
        parts.join(", ")
    }
}

/// Mutable staging form of a profile, as produced by resume parsing.
/// Freeze it with `CandidateProfile::from`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDraft {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<u32>,
    pub skills: Vec<String>,
    pub education: Vec<EducationEntry>,
    pub work_authorization: Option<bool>,
    pub salary_expectation: Option<String>,
    pub cover_letter: Option<String>,
}

/// Read-only candidate facts. No setters: once built it is shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateProfile {
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    location: Option<String>,
    years_of_experience: Option<u32>,
    skills: Vec<String>,
    education: Vec<EducationEntry>,
    work_authorization: Option<bool>,
    salary_expectation: Option<String>,
    cover_letter: Option<String>,
}

impl From<ProfileDraft> for CandidateProfile {
    fn from(draft: ProfileDraft) -> Self {
        Self {
            full_name: present(draft.full_name),
            email: present(draft.email),
            phone: present(draft.phone),
            location: present(draft.location),
            years_of_experience: draft.years_of_experience,
            skills: draft
                .skills
                .into_iter()
                .filter_map(|s| present(Some(s)))
                .collect(),
            education: draft
                .education
                .into_iter()
                .filter(|e| !e.institution.trim().is_empty())
                .collect(),
            work_authorization: draft.work_authorization,
            salary_expectation: present(draft.salary_expectation),
            cover_letter: present(draft.cover_letter),
        }
    }
}

/// Blank strings are absent facts.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CandidateProfile {
    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    pub fn years_of_experience(&self) -> Option<u32> {
        self.years_of_experience
    }

    pub fn work_authorization(&self) -> Option<bool> {
        self.work_authorization
    }

    /// The fact for `key` rendered as a form-ready string, or `None` when absent.
    pub fn value_for(&self, key: ProfileKey) -> Option<String> {
        match key {
            ProfileKey::FullName => self.full_name.clone(),
            ProfileKey::Email => self.email.clone(),
            ProfileKey::Phone => self.phone.clone(),
            ProfileKey::Location => self.location.clone(),
            ProfileKey::YearsOfExperience => self.years_of_experience.map(|y| y.to_string()),
            ProfileKey::Skills => {
                (!self.skills.is_empty()).then(|| self.skills.join(", "))
            }
            ProfileKey::Education => (!self.education.is_empty()).then(|| {
                self.education
                    .iter()
                    .map(EducationEntry::describe)
                    .collect::<Vec<_>>()
                    .join("; ")
            }),
            ProfileKey::WorkAuthorization => self
                .work_authorization
                .map(|ok| (if ok { "Yes" } else { "No" }).to_string()),
            ProfileKey::SalaryExpectation => self.salary_expectation.clone(),
            ProfileKey::CoverLetter => self.cover_letter.clone(),
        }
    }

    /// Prompt excerpt for the given keys, one `label: value` line each.
    /// Absent facts are spelled out as unknown so the model does not fill them in.
    pub fn excerpt(&self, keys: &[ProfileKey]) -> String {
        keys.iter()
            .map(|key| {
                let value = self
                    .value_for(*key)
                    .unwrap_or_else(|| "unknown".to_string());
                format!("{}: {}", key.label(), value)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn present_count(&self) -> usize {
        ProfileKey::ALL
            .iter()
            .filter(|key| self.value_for(**key).is_some())
            .count()
    }
}
