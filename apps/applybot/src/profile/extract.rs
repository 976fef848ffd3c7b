//! Resume ingestion: file → raw text → `CandidateProfile`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{complete_json, CompletionService};
use crate::profile::prompts::{PROFILE_PARSE_PROMPT_TEMPLATE, PROFILE_PARSE_SYSTEM};
use crate::profile::{CandidateProfile, ProfileDraft};

/// Resume text beyond this is not sent to the model.
const RESUME_PROMPT_CHARS: usize = 3000;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read resume {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },

    #[error("resume text is empty")]
    EmptyResume,
}

/// Extracts raw text from a resume file. PDFs go through `pdf-extract` on a blocking
/// thread; anything else is read as UTF-8 text.
pub async fn extract_resume_text(path: &Path) -> Result<String, ProfileError> {
    let owned = path.to_path_buf();
    let is_pdf = owned
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        let pdf_path = owned.clone();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text(&pdf_path))
            .await
            .map_err(|e| ProfileError::Pdf {
                path: owned.clone(),
                message: format!("extraction task failed: {e}"),
            })?
            .map_err(|e| ProfileError::Pdf {
                path: owned.clone(),
                message: format!("{e:?}"),
            })?
    } else {
        tokio::fs::read_to_string(&owned)
            .await
            .map_err(|source| ProfileError::Io {
                path: owned.clone(),
                source,
            })?
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ProfileError::EmptyResume);
    }
    Ok(text)
}

/// Builds the Candidate Profile from extracted resume text.
#[async_trait]
pub trait ProfileBuilder: Send + Sync {
    async fn build(&self, resume_text: &str) -> Result<CandidateProfile, ProfileError>;
}

/// AI-backed builder. Falls back to the heuristic scan when the completion fails, so a
/// flaky AI service degrades to a sparser profile instead of aborting the run.
pub struct LlmProfileBuilder {
    completion: Arc<dyn CompletionService>,
}

impl LlmProfileBuilder {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl ProfileBuilder for LlmProfileBuilder {
    async fn build(&self, resume_text: &str) -> Result<CandidateProfile, ProfileError> {
        if resume_text.trim().is_empty() {
            return Err(ProfileError::EmptyResume);
        }

        let excerpt: String = resume_text.chars().take(RESUME_PROMPT_CHARS).collect();
        let prompt = PROFILE_PARSE_PROMPT_TEMPLATE.replace("{resume_text}", &excerpt);

        match complete_json::<ProfileDraft>(self.completion.as_ref(), &prompt, PROFILE_PARSE_SYSTEM)
            .await
        {
            Ok(draft) => {
                let profile = CandidateProfile::from(draft);
                info!(facts = profile.present_count(), "Candidate profile extracted");
                Ok(profile)
            }
            Err(e) => {
                warn!("Profile extraction via AI failed, using heuristic scan: {e}");
                Ok(heuristic_profile(resume_text))
            }
        }
    }
}

/// Contact facts that can be read off the text without interpretation.
pub fn heuristic_profile(resume_text: &str) -> CandidateProfile {
    CandidateProfile::from(ProfileDraft {
        email: find_email(resume_text),
        phone: find_phone(resume_text),
        ..ProfileDraft::default()
    })
}

fn find_email(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| {
            token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.')
        })
        .map(|token| token.trim_end_matches('.'))
        .find(|token| {
            token.split_once('@').is_some_and(|(user, domain)| {
                !user.is_empty() && domain.contains('.') && !domain.starts_with('.')
            })
        })
        .map(str::to_string)
}

fn find_phone(text: &str) -> Option<String> {
    let is_phone_char =
        |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' ');

    for line in text.lines() {
        let mut run = String::new();
        for c in line.chars().chain(std::iter::once('\n')) {
            if is_phone_char(c) {
                run.push(c);
                continue;
            }
            let candidate = run.trim();
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            if (10..=15).contains(&digits) {
                return Some(candidate.to_string());
            }
            run.clear();
        }
    }
    None
}
