//! Browser capability: the only surface through which the engine touches a page.
//!
//! Elements are found by *intent* (what the engine wants), not by selector. A driver maps
//! each intent to whatever query its page technology needs; `WebDriverPage` is the
//! production implementation and tests script a fake.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::automation::models::RawField;
use crate::automation::timing::{Interval, TimingSimulator};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// URL fragments the board uses for verification gates.
const CHECKPOINT_URL_MARKERS: &[&str] = &["checkpoint", "challenge", "captcha"];

/// What the engine is looking for on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectorIntent {
    LoginUsername,
    LoginPassword,
    LoginSubmit,
    /// CAPTCHA, 2FA or any "verify it's you" gate.
    CheckpointMarker,
    JobCard,
    JobCardTitle,
    JobCardCompany,
    JobCardLink,
    QuickApplyBadge,
    QuickApplyButton,
    AlreadyAppliedNotice,
    PremiumUpsell,
    ApplyModal,
    ModalField,
    NextButton,
    ReviewButton,
    SubmitButton,
    SubmissionConfirmation,
    ModalDismiss,
    DiscardConfirm,
}

/// Opaque reference to a located element, valid until the page re-renders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("element {0} is no longer attached to the page")]
    Stale(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("element {element} cannot accept {action}")]
    NotInteractable { element: String, action: String },
}

impl BrowserError {
    /// Re-render races that usually clear up on a second look.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::Stale(_) | BrowserError::Timeout(_))
    }
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn locate(&self, intent: SelectorIntent) -> Result<Option<ElementHandle>, BrowserError>;
    async fn locate_all(&self, intent: SelectorIntent) -> Result<Vec<ElementHandle>, BrowserError>;
    async fn locate_within(
        &self,
        parent: &ElementHandle,
        intent: SelectorIntent,
    ) -> Result<Option<ElementHandle>, BrowserError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError>;
    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;
    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;
    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError>;

    /// Reads label, kind, required flag, options and current value of a form field.
    async fn describe_field(&self, field: &ElementHandle) -> Result<RawField, BrowserError>;
    async fn clear_field(&self, field: &ElementHandle) -> Result<(), BrowserError>;
    /// Sends `text` as keystrokes to the field's input.
    async fn type_text(&self, field: &ElementHandle, text: &str) -> Result<(), BrowserError>;
    /// Picks an option of a select or radio group by its visible label.
    async fn choose_option(&self, field: &ElementHandle, option: &str)
        -> Result<(), BrowserError>;
    async fn set_checked(&self, field: &ElementHandle, checked: bool) -> Result<(), BrowserError>;
    async fn attach_file(&self, field: &ElementHandle, path: &Path) -> Result<(), BrowserError>;
}

fn is_checkpoint_url(url: &str) -> bool {
    let lowered = url.to_lowercase();
    CHECKPOINT_URL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// The current URL when the page shows a CAPTCHA, 2FA or other verification gate.
pub async fn checkpoint_url(page: &dyn BrowserPage) -> Result<Option<String>, BrowserError> {
    let url = page.current_url().await?;
    if is_checkpoint_url(&url) || page.locate(SelectorIntent::CheckpointMarker).await?.is_some() {
        return Ok(Some(url));
    }
    Ok(None)
}

/// Polls for `intent` until it appears or `timeout` elapses.
pub async fn wait_for(
    page: &dyn BrowserPage,
    intent: SelectorIntent,
    timeout: Duration,
) -> Result<Option<ElementHandle>, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = page.locate(intent).await? {
            return Ok(Some(element));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Types `text` one character at a time with keystroke cadence from the simulator.
pub async fn type_humanized(
    page: &dyn BrowserPage,
    field: &ElementHandle,
    text: &str,
    timing: &TimingSimulator,
) -> Result<(), BrowserError> {
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        page.type_text(field, ch.encode_utf8(&mut buf)).await?;
        timing.pause(Interval::Keystroke).await;
    }
    Ok(())
}

/// Clicks with a short human hesitation beforehand.
pub async fn click_humanized(
    page: &dyn BrowserPage,
    element: &ElementHandle,
    timing: &TimingSimulator,
) -> Result<(), BrowserError> {
    timing.pause(Interval::Field).await;
    page.click(element).await
}
