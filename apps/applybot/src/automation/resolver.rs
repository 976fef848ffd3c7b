//! Field Resolver: produces an answer for a classified field, or nothing.
//!
//! Two tiers:
//! 1. Deterministic: field type → profile fact → formatted for the input kind.
//!    Choice inputs take the closest option (exact, numeric range, then whole words).
//!    Yes/No questions only resolve here from boolean facts.
//! 2. AI fallback: only when the type is unknown or tier 1 missed. The answer is
//!    constrained to the declared options; malformed or empty responses are absent.
//!
//! A failed AI call is retried once after a backoff. Persistent failure is recorded in
//! the resolution, never escalated here: the navigator decides whether an absent value
//! blocks the job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::automation::classifier::fold_label;
use crate::automation::models::{FieldType, FormFieldDescriptor, InputKind, JobListing};
use crate::automation::prompts::{FIELD_RESOLUTION_PROMPT_TEMPLATE, FIELD_RESOLUTION_SYSTEM};
use crate::llm_client::prompts::TRUTHFULNESS_INSTRUCTION;
use crate::llm_client::{strip_json_fences, CompletionService, LlmError};
use crate::profile::{CandidateProfile, ProfileKey};

const MAX_TEXT_CHARS: usize = 300;
const MAX_TEXTAREA_CHARS: usize = 2000;
const AI_ATTEMPTS: u32 = 2;

/// Placeholder entries boards put at the top of dropdowns.
const PLACEHOLDER_OPTIONS: &[&str] = &["select an option", "select", "choose", "please select"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Deterministic,
    Ai,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Option<String>,
    pub source: ResolutionSource,
    /// The AI service was needed but failed after its retry.
    pub ai_failed: bool,
}

impl Resolution {
    fn deterministic(value: String) -> Self {
        Self {
            value: Some(value),
            source: ResolutionSource::Deterministic,
            ai_failed: false,
        }
    }

    fn absent(ai_failed: bool) -> Self {
        Self {
            value: None,
            source: ResolutionSource::Absent,
            ai_failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub ai_timeout: Duration,
    pub retry_backoff: Duration,
    pub prompt_template: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ai_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(1500),
            prompt_template: FIELD_RESOLUTION_PROMPT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AiAnswer {
    answer: Option<Value>,
}

pub struct FieldResolver {
    profile: Arc<CandidateProfile>,
    completion: Arc<dyn CompletionService>,
    settings: ResolverSettings,
    resume_path: Option<PathBuf>,
}

impl FieldResolver {
    pub fn new(
        profile: Arc<CandidateProfile>,
        completion: Arc<dyn CompletionService>,
        settings: ResolverSettings,
        resume_path: Option<PathBuf>,
    ) -> Self {
        Self {
            profile,
            completion,
            settings,
            resume_path,
        }
    }

    pub async fn resolve(&self, field: &FormFieldDescriptor, job: &JobListing) -> Resolution {
        if field.kind == InputKind::File {
            return match &self.resume_path {
                Some(path) => Resolution::deterministic(path.display().to_string()),
                None => Resolution::absent(false),
            };
        }

        if let Some(value) = self.deterministic(field) {
            debug!(field_type = ?field.field_type, "Field resolved deterministically");
            return Resolution::deterministic(value);
        }

        match self.ask_ai(field, job).await {
            Ok(Some(value)) => Resolution {
                value: Some(value),
                source: ResolutionSource::Ai,
                ai_failed: false,
            },
            Ok(None) => Resolution::absent(false),
            Err(e) => {
                warn!(label = %field.label, "AI resolution failed: {e}");
                Resolution::absent(true)
            }
        }
    }

    /// Tier 1. `None` when the profile lacks the fact or it fits none of the options.
    fn deterministic(&self, field: &FormFieldDescriptor) -> Option<String> {
        let boolean_fact = matches!(
            field.field_type,
            FieldType::WorkAuthorization | FieldType::Skill
        );
        if field.is_constrained() && !boolean_fact && is_yes_no(&field.options) {
            return None;
        }

        let raw = match field.field_type {
            FieldType::Skill => self.skill_answer(field)?,
            FieldType::ExperienceYears => {
                // Total years say nothing about one named technology.
                let folded = format!(" {} ", fold_label(&field.label));
                if folded.contains(" with ") || folded.contains(" using ") {
                    return None;
                }
                self.profile.value_for(ProfileKey::YearsOfExperience)?
            }
            other => self.profile.value_for(profile_key(other)?)?,
        };

        if field.is_constrained() {
            match_option(&raw, &field.options)
        } else {
            Some(raw)
        }
    }

    /// Yes/No skill questions answer "Yes" only for skills the resume lists.
    fn skill_answer(&self, field: &FormFieldDescriptor) -> Option<String> {
        if !field.is_constrained() {
            return None;
        }
        let label = format!(" {} ", fold_label(&field.label));
        let listed = self.profile.skills().iter().any(|skill| {
            let skill = fold_label(skill);
            !skill.is_empty() && label.contains(&format!(" {skill} "))
        });
        listed.then(|| "Yes".to_string())
    }

    async fn ask_ai(
        &self,
        field: &FormFieldDescriptor,
        job: &JobListing,
    ) -> Result<Option<String>, LlmError> {
        let prompt = self.build_prompt(field, job);
        let mut last_error = LlmError::EmptyContent;

        for attempt in 0..AI_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(self.settings.retry_backoff).await;
            }

            let call = self.completion.complete(&prompt, FIELD_RESOLUTION_SYSTEM);
            let outcome = match tokio::time::timeout(self.settings.ai_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.settings.ai_timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(text) => return Ok(parse_ai_answer(&text, field)),
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt + 1, "AI field resolution attempt failed: {e}");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    fn build_prompt(&self, field: &FormFieldDescriptor, job: &JobListing) -> String {
        let options = usable_options(&field.options);
        let options = if options.is_empty() {
            "none (free text)".to_string()
        } else {
            options.join(" | ")
        };

        self.settings
            .prompt_template
            .replace("{truthfulness_instruction}", TRUTHFULNESS_INSTRUCTION)
            .replace("{job_title}", &job.title)
            .replace("{company}", &job.company)
            .replace("{label}", &field.label)
            .replace("{kind}", field.kind.as_str())
            .replace("{options}", &options)
            .replace("{profile}", &self.profile.excerpt(relevant_keys(field.field_type)))
    }
}

fn profile_key(field_type: FieldType) -> Option<ProfileKey> {
    match field_type {
        FieldType::Name => Some(ProfileKey::FullName),
        FieldType::Email => Some(ProfileKey::Email),
        FieldType::Phone => Some(ProfileKey::Phone),
        FieldType::ExperienceYears => Some(ProfileKey::YearsOfExperience),
        FieldType::Location => Some(ProfileKey::Location),
        FieldType::WorkAuthorization => Some(ProfileKey::WorkAuthorization),
        FieldType::Salary => Some(ProfileKey::SalaryExpectation),
        FieldType::CoverLetter => Some(ProfileKey::CoverLetter),
        FieldType::Sponsorship | FieldType::Skill | FieldType::Unknown => None,
    }
}

/// Profile excerpt sent with each AI prompt: the facts the field type plausibly needs.
fn relevant_keys(field_type: FieldType) -> &'static [ProfileKey] {
    match field_type {
        FieldType::Name => &[ProfileKey::FullName],
        FieldType::Email => &[ProfileKey::Email],
        FieldType::Phone => &[ProfileKey::Phone, ProfileKey::Location],
        FieldType::ExperienceYears | FieldType::Skill => &[
            ProfileKey::YearsOfExperience,
            ProfileKey::Skills,
            ProfileKey::Education,
        ],
        FieldType::Location => &[ProfileKey::Location, ProfileKey::WorkAuthorization],
        FieldType::WorkAuthorization | FieldType::Sponsorship => {
            &[ProfileKey::WorkAuthorization, ProfileKey::Location]
        }
        FieldType::Salary => &[ProfileKey::SalaryExpectation, ProfileKey::YearsOfExperience],
        FieldType::CoverLetter => &[
            ProfileKey::FullName,
            ProfileKey::YearsOfExperience,
            ProfileKey::Skills,
            ProfileKey::CoverLetter,
        ],
        FieldType::Unknown => &ProfileKey::ALL,
    }
}

fn usable_options(options: &[String]) -> Vec<&str> {
    options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty() && !PLACEHOLDER_OPTIONS.contains(&o.to_lowercase().as_str()))
        .collect()
}

fn is_yes_no(options: &[String]) -> bool {
    usable_options(options).iter().any(|o| {
        matches!(fold_label(o).split(' ').next(), Some("yes") | Some("no"))
    })
}

/// Interprets a model response for `field`. Anything unusable is `None`.
fn parse_ai_answer(text: &str, field: &FormFieldDescriptor) -> Option<String> {
    let parsed: AiAnswer = serde_json::from_str(strip_json_fences(text)).ok()?;
    let answer = match parsed.answer? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if b { "Yes" } else { "No" }).to_string(),
        _ => return None,
    };
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }

    if field.is_constrained() {
        return match_option(answer, &field.options);
    }

    let limit = if field.kind == InputKind::Textarea {
        MAX_TEXTAREA_CHARS
    } else {
        MAX_TEXT_CHARS
    };
    Some(answer.chars().take(limit).collect())
}

/// Picks the option that best represents `value`, never anything outside `options`.
///
/// Order: case-insensitive exact match, numeric range containment ("3-5 years",
/// "10+ years"), then a whole-word run of one inside the other. A value whose words
/// fit more than one option is ambiguous and matches nothing.
pub fn match_option(value: &str, options: &[String]) -> Option<String> {
    let candidates = usable_options(options);
    let wanted = value.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Some(exact) = candidates.iter().find(|o| o.to_lowercase() == wanted) {
        return Some(exact.to_string());
    }

    if let Ok(number) = wanted.parse::<f64>() {
        if let Some(ranged) = candidates
            .iter()
            .find(|o| numeric_range(o).is_some_and(|(lo, hi)| number >= lo && number <= hi))
        {
            return Some(ranged.to_string());
        }
    }

    let value_words = words(&wanted);
    let mut matched = candidates.iter().filter(|o| {
        let option_words = words(o);
        contains_run(&value_words, &option_words) || contains_run(&option_words, &value_words)
    });
    match (matched.next(), matched.next()) {
        (Some(only), None) => Some(only.to_string()),
        _ => None,
    }
}

fn words(text: &str) -> Vec<String> {
    fold_label(text).split(' ').filter(|w| !w.is_empty()).map(String::from).collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// `"3-5 years"` → (3, 5); `"10+ years"` → (10, ∞); `"7"` → (7, 7).
fn numeric_range(option: &str) -> Option<(f64, f64)> {
    let numbers: Vec<f64> = option
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match numbers.as_slice() {
        [only] if option.contains('+') => Some((*only, f64::INFINITY)),
        [only] => Some((*only, *only)),
        [lo, hi, ..] => Some((*lo, *hi)),
        [] => None,
    }
}
