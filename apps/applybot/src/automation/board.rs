//! Job board adapter: login, search URL construction and the lazy job feed.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::automation::browser::{
    checkpoint_url, click_humanized, type_humanized, wait_for, BrowserError, BrowserPage,
    ElementHandle, SelectorIntent,
};
use crate::automation::models::JobListing;
use crate::automation::run_config::{JobType, RunConfiguration, Secret, WorkMode};
use crate::automation::timing::{Interval, TimingSimulator};

pub const BOARD_ORIGIN: &str = "https://www.linkedin.com";
pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";

/// Landing pages that mean the session is authenticated.
const LOGGED_IN_MARKERS: &[&str] = &["/feed", "/mynetwork"];

/// Page stride of the `start` parameter; every card on a page is read.
const RESULTS_PER_PAGE: u32 = 25;
const SCROLLS_PER_PAGE: u32 = 3;
const SCROLL_PIXELS: i64 = 900;
/// Result pages beyond this are never requested.
const MAX_RESULT_PAGES: u32 = 40;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("login did not complete after {attempts} attempts")]
    LoginFailed { attempts: u32 },

    #[error("verification checkpoint at {0}")]
    Checkpoint(String),

    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error("browser failure: {0}")]
    Browser(#[from] BrowserError),
}

// ────────────────────────────────────────────────────────────────────────────
// Search query
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
    pub job_types: Vec<JobType>,
    pub work_modes: Vec<WorkMode>,
}

impl SearchQuery {
    pub fn from_config(config: &RunConfiguration) -> Self {
        Self {
            keyword: config.primary_keyword().to_string(),
            location: config.location.clone(),
            job_types: config.job_types.clone(),
            work_modes: config.work_modes.clone(),
        }
    }

    /// Results URL for the zero-based `page`, filtered to quick-apply listings.
    pub fn page_url(&self, page: u32) -> Result<String, BoardError> {
        let job_types = join_codes(self.job_types.iter().map(|t| t.search_code()));
        let work_modes = join_codes(self.work_modes.iter().map(|m| m.search_code()));
        let start = (page * RESULTS_PER_PAGE).to_string();

        let mut params = vec![
            ("keywords", self.keyword.as_str()),
            ("location", self.location.as_str()),
            ("f_AL", "true"),
        ];
        if !job_types.is_empty() {
            params.push(("f_JT", job_types.as_str()));
        }
        if !work_modes.is_empty() {
            params.push(("f_WT", work_modes.as_str()));
        }
        params.push(("start", start.as_str()));

        reqwest::Url::parse_with_params(SEARCH_URL, &params)
            .map(String::from)
            .map_err(|e| BoardError::InvalidQuery(e.to_string()))
    }
}

fn join_codes<'a>(codes: impl Iterator<Item = &'a str>) -> String {
    codes.collect::<Vec<_>>().join(",")
}

// ────────────────────────────────────────────────────────────────────────────
// Board session
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BoardSettings {
    pub login_attempts: u32,
    pub step_timeout: Duration,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            login_attempts: 3,
            step_timeout: Duration::from_secs(10),
        }
    }
}

pub struct JobBoard {
    page: Arc<dyn BrowserPage>,
    timing: Arc<TimingSimulator>,
    settings: BoardSettings,
}

impl JobBoard {
    pub fn new(
        page: Arc<dyn BrowserPage>,
        timing: Arc<TimingSimulator>,
        settings: BoardSettings,
    ) -> Self {
        Self {
            page,
            timing,
            settings,
        }
    }

    /// Signs in, retrying up to the configured number of attempts.
    /// A verification gate ends the attempt loop immediately.
    pub async fn login(&self, email: &str, password: &Secret) -> Result<(), BoardError> {
        let attempts = self.settings.login_attempts.max(1);

        for attempt in 1..=attempts {
            self.page.goto(LOGIN_URL).await?;
            self.timing.pause(Interval::Step).await;

            if self.logged_in().await? {
                info!("Session already authenticated");
                return Ok(());
            }

            match self.submit_credentials(email, password).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(attempt, "Login form not usable: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            self.timing.pause(Interval::Step).await;

            if let Some(url) = checkpoint_url(self.page.as_ref()).await? {
                warn!(%url, "Login hit a verification checkpoint");
                return Err(BoardError::Checkpoint(url));
            }
            if self.logged_in().await? {
                info!(attempt, "Logged in");
                return Ok(());
            }
            warn!(attempt, "Login attempt did not reach the feed");
        }

        Err(BoardError::LoginFailed { attempts })
    }

    pub fn feed(&self, query: SearchQuery) -> JobFeed {
        JobFeed {
            page: self.page.clone(),
            timing: self.timing.clone(),
            query,
            next_page: 0,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    async fn logged_in(&self) -> Result<bool, BrowserError> {
        let url = self.page.current_url().await?;
        Ok(LOGGED_IN_MARKERS.iter().any(|m| url.contains(m)))
    }

    async fn submit_credentials(&self, email: &str, password: &Secret) -> Result<(), BrowserError> {
        let timeout = self.settings.step_timeout;
        let username = wait_for(self.page.as_ref(), SelectorIntent::LoginUsername, timeout)
            .await?
            .ok_or_else(|| BrowserError::Timeout("login username field".to_string()))?;
        let secret = self
            .page
            .locate(SelectorIntent::LoginPassword)
            .await?
            .ok_or_else(|| BrowserError::Timeout("login password field".to_string()))?;
        let submit = self
            .page
            .locate(SelectorIntent::LoginSubmit)
            .await?
            .ok_or_else(|| BrowserError::Timeout("login submit button".to_string()))?;

        self.page.clear_field(&username).await?;
        type_humanized(self.page.as_ref(), &username, email, &self.timing).await?;
        self.timing.pause(Interval::Field).await;
        self.page.clear_field(&secret).await?;
        type_humanized(self.page.as_ref(), &secret, password.expose(), &self.timing).await?;
        click_humanized(self.page.as_ref(), &submit, &self.timing).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job feed
// ────────────────────────────────────────────────────────────────────────────

/// Lazy sequence of quick-apply listings in discovery order.
///
/// Result pages are fetched only when the buffer runs dry. `restart()` rewinds to the
/// first results page; listings already yielded are not yielded again.
pub struct JobFeed {
    page: Arc<dyn BrowserPage>,
    timing: Arc<TimingSimulator>,
    query: SearchQuery,
    next_page: u32,
    buffer: VecDeque<JobListing>,
    seen: HashSet<String>,
    exhausted: bool,
}

impl JobFeed {
    pub async fn next(&mut self) -> Result<Option<JobListing>, BoardError> {
        while self.buffer.is_empty() && !self.exhausted {
            self.load_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    pub fn restart(&mut self) {
        self.next_page = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    async fn load_page(&mut self) -> Result<(), BoardError> {
        if self.next_page >= MAX_RESULT_PAGES {
            self.exhausted = true;
            return Ok(());
        }

        let url = self.query.page_url(self.next_page)?;
        debug!(page = self.next_page, %url, "Loading search results");
        self.page.goto(&url).await?;
        self.timing.pause(Interval::Step).await;
        if let Some(url) = checkpoint_url(self.page.as_ref()).await? {
            warn!(%url, "Search hit a verification checkpoint");
            return Err(BoardError::Checkpoint(url));
        }

        for _ in 0..SCROLLS_PER_PAGE {
            self.page.scroll_by(SCROLL_PIXELS).await?;
            self.timing.pause(Interval::Field).await;
        }

        let cards = self.page.locate_all(SelectorIntent::JobCard).await?;
        if cards.is_empty() {
            info!(page = self.next_page, "No more search results");
            self.exhausted = true;
            return Ok(());
        }

        let mut added = 0;
        for card in &cards {
            match self.read_card(card).await {
                Ok(Some(listing)) if listing.quick_apply => {
                    if self.seen.insert(listing.id.clone()) {
                        self.buffer.push_back(listing);
                        added += 1;
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => warn!("Skipping unreadable job card: {e}"),
                Err(e) => return Err(e.into()),
            }
        }
        info!(page = self.next_page, cards = cards.len(), added, "Search page scanned");

        self.next_page += 1;
        Ok(())
    }

    /// `None` for cards without a recognizable job id.
    async fn read_card(&self, card: &ElementHandle) -> Result<Option<JobListing>, BrowserError> {
        let link = self
            .page
            .locate_within(card, SelectorIntent::JobCardLink)
            .await?;
        let href = match &link {
            Some(link) => self.page.attribute(link, "href").await?,
            None => None,
        };
        let id = match self.page.attribute(card, "data-job-id").await? {
            Some(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            _ => href.as_deref().and_then(job_id_from_href),
        };
        let Some(id) = id else {
            debug!("Job card without id");
            return Ok(None);
        };

        let title = self.card_text(card, SelectorIntent::JobCardTitle).await?;
        let company = self.card_text(card, SelectorIntent::JobCardCompany).await?;
        let quick_apply = self
            .page
            .locate_within(card, SelectorIntent::QuickApplyBadge)
            .await?
            .is_some();

        let url = format!("{BOARD_ORIGIN}/jobs/view/{id}/");
        Ok(Some(JobListing::new(id, title, company, url, quick_apply)))
    }

    async fn card_text(
        &self,
        card: &ElementHandle,
        intent: SelectorIntent,
    ) -> Result<String, BrowserError> {
        match self.page.locate_within(card, intent).await? {
            Some(element) => Ok(self.page.text(&element).await?.trim().to_string()),
            None => Ok(String::new()),
        }
    }
}

/// `/jobs/view/3712345678/?refId=...` → `3712345678`.
fn job_id_from_href(href: &str) -> Option<String> {
    let rest = href.split("/jobs/view/").nth(1)?;
    let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}
