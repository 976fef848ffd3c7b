use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::automation::board::BoardSettings;
use crate::automation::classifier::{ClassifierRules, FieldClassifier};
use crate::automation::navigator::NavigatorSettings;
use crate::automation::prompts::FIELD_RESOLUTION_PROMPT_TEMPLATE;
use crate::automation::resolver::ResolverSettings;
use crate::automation::session::SessionSettings;
use crate::automation::timing::{DelayRange, TimingProfile};

/// Application configuration loaded from environment variables.
/// Fails at startup if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub upload_dir: PathBuf,
    /// Absent means outcome rows are only logged locally.
    pub sheets_token: Option<String>,
    pub engine: EngineSettings,
}

/// Tunables for the automation engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_form_steps: u32,
    pub job_timeout: Duration,
    pub ai_timeout: Duration,
    pub step_timeout: Duration,
    pub login_attempts: u32,
    pub ai_retry_backoff: Duration,
    pub timing: TimingProfile,
    pub classifier_rules: ClassifierRules,
    pub resolver_prompt: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_form_steps: 10,
            job_timeout: Duration::from_secs(300),
            ai_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(10),
            login_attempts: 3,
            ai_retry_backoff: Duration::from_millis(1500),
            timing: TimingProfile::default(),
            classifier_rules: ClassifierRules::default(),
            resolver_prompt: FIELD_RESOLUTION_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            job_timeout: self.job_timeout,
            board: BoardSettings {
                login_attempts: self.login_attempts,
                step_timeout: self.step_timeout,
            },
            navigator: NavigatorSettings {
                max_steps: self.max_form_steps,
                step_timeout: self.step_timeout,
            },
            resolver: ResolverSettings {
                ai_timeout: self.ai_timeout,
                retry_backoff: self.ai_retry_backoff,
                prompt_template: self.resolver_prompt.clone(),
            },
        }
    }

    pub fn classifier(&self) -> FieldClassifier {
        FieldClassifier::new(self.classifier_rules.clone())
    }

    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_secs(parse_or(var, key, default.as_secs())?))
        };

        let timing = TimingProfile {
            keystroke: delay_or(var, "TIMING_KEYSTROKE_MS", defaults.timing.keystroke)?,
            field: delay_or(var, "TIMING_FIELD_MS", defaults.timing.field)?,
            step: delay_or(var, "TIMING_STEP_MS", defaults.timing.step)?,
            job: delay_or(var, "TIMING_JOB_MS", defaults.timing.job)?,
        };

        let classifier_rules = match var("CLASSIFIER_RULES_PATH") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read classifier rules from '{path}'"))?;
                ClassifierRules::from_json(&json)
                    .with_context(|| format!("Classifier rules in '{path}' are not valid"))?
            }
            None => defaults.classifier_rules,
        };

        let resolver_prompt = match var("RESOLVER_PROMPT_PATH") {
            Some(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read resolver prompt from '{path}'"))?,
            None => defaults.resolver_prompt,
        };

        Ok(Self {
            max_form_steps: parse_or(var, "MAX_FORM_STEPS", defaults.max_form_steps)?,
            job_timeout: secs("JOB_TIMEOUT_SECS", defaults.job_timeout)?,
            ai_timeout: secs("AI_TIMEOUT_SECS", defaults.ai_timeout)?,
            step_timeout: secs("STEP_TIMEOUT_SECS", defaults.step_timeout)?,
            login_attempts: parse_or(var, "LOGIN_ATTEMPTS", defaults.login_attempts)?,
            ai_retry_backoff: Duration::from_millis(parse_or(
                var,
                "AI_RETRY_BACKOFF_MS",
                defaults.ai_retry_backoff.as_millis() as u64,
            )?),
            timing,
            classifier_rules,
            resolver_prompt,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Config {
            anthropic_api_key: require(var, "ANTHROPIC_API_KEY")?,
            port: parse_or(var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            webdriver_url: var("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:4444".to_string()),
            headless: parse_or(var, "HEADLESS", false)?,
            upload_dir: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
            sheets_token: var("GOOGLE_SHEETS_TOKEN").filter(|t| !t.trim().is_empty()),
            engine: EngineSettings::from_lookup(var)?,
        })
    }
}

fn require(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn delay_or(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: DelayRange,
) -> Result<DelayRange> {
    match var(key) {
        Some(raw) => DelayRange::parse(&raw).map_err(|e| anyhow::anyhow!("{key}: {e}")),
        None => Ok(default),
    }
}
