//! `BrowserPage` over a WebDriver session (chromedriver/geckodriver) via `fantoccini`.
//!
//! Located elements are kept in a registry and handed out as opaque ids, so the engine
//! never sees a driver type.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::automation::browser::{BrowserError, BrowserPage, ElementHandle, SelectorIntent};
use crate::automation::models::{InputKind, RawField};

#[derive(Debug, Clone, Copy)]
enum Query {
    Css(&'static str),
    XPath(&'static str),
}

impl Query {
    fn locator(self) -> Locator<'static> {
        match self {
            Query::Css(s) => Locator::Css(s),
            Query::XPath(s) => Locator::XPath(s),
        }
    }
}

/// Where each intent lives on the job board.
fn query_for(intent: SelectorIntent) -> Query {
    use SelectorIntent::*;
    match intent {
        LoginUsername => Query::Css("#username"),
        LoginPassword => Query::Css("#password"),
        LoginSubmit => Query::Css("form button[type='submit']"),
        CheckpointMarker => Query::Css(
            "#captcha-internal, iframe[src*='captcha'], #input__phone_verification_pin, \
             form#email-pin-challenge",
        ),
        JobCard => Query::Css("li[data-occludable-job-id], div.job-card-container"),
        JobCardTitle => Query::Css(".job-card-list__title, .job-card-container__link strong"),
        JobCardCompany => Query::Css(
            ".job-card-container__primary-description, .artdeco-entity-lockup__subtitle",
        ),
        JobCardLink => Query::Css("a.job-card-container__link, a.job-card-list__title"),
        QuickApplyBadge => Query::XPath(".//*[contains(normalize-space(.), 'Easy Apply')]"),
        QuickApplyButton => Query::XPath(
            "//button[contains(@class, 'jobs-apply-button') and contains(., 'Easy Apply')]",
        ),
        AlreadyAppliedNotice => Query::Css(
            ".jobs-s-apply .artdeco-inline-feedback--success, .post-apply-timeline",
        ),
        PremiumUpsell => Query::Css(".premium-upsell-link, .artdeco-modal .premium-upsell"),
        ApplyModal => Query::Css(".jobs-easy-apply-modal, div[role='dialog'][data-test-modal]"),
        ModalField => Query::Css(
            ".jobs-easy-apply-modal .fb-dash-form-element, \
             .jobs-easy-apply-modal .jobs-easy-apply-form-section__grouping",
        ),
        NextButton => Query::Css("button[aria-label='Continue to next step']"),
        ReviewButton => Query::Css("button[aria-label='Review your application']"),
        SubmitButton => Query::Css("button[aria-label='Submit application']"),
        SubmissionConfirmation => Query::Css(
            "div[data-test-modal-id='post-apply-modal'], .jpac-modal-header",
        ),
        ModalDismiss => Query::Css("button[aria-label='Dismiss']"),
        DiscardConfirm => Query::Css(
            "button[data-control-name='discard_application_confirm_btn'], \
             button[data-test-dialog-primary-btn]",
        ),
    }
}

/// Reads one form-field container into a `RawField`-shaped object.
const DESCRIBE_FIELD_JS: &str = r#"
const root = arguments[0];
const q = (s) => root.querySelector(s);
const labelEl = q('label, legend');
const label = ((labelEl ? labelEl.innerText : root.innerText) || '').trim().split('\n')[0];
let kind = 'text', options = [], value = null, input = null;
if ((input = q('select'))) {
  kind = 'select';
  options = [...input.options].map((o) => o.text.trim());
  value = input.selectedIndex > 0 ? input.options[input.selectedIndex].text.trim() : null;
} else if (q('input[type=radio]')) {
  kind = 'radio';
  const radios = [...root.querySelectorAll('input[type=radio]')];
  options = radios.map((r) => {
    const l = root.querySelector(`label[for="${r.id}"]`);
    return (l ? l.innerText : r.value).trim();
  });
  const checked = radios.findIndex((r) => r.checked);
  value = checked >= 0 ? options[checked] : null;
  input = radios[0];
} else if ((input = q('input[type=checkbox]'))) {
  kind = 'checkbox';
  options = ['Yes', 'No'];
  value = input.checked ? 'Yes' : null;
} else if ((input = q('textarea'))) {
  kind = 'textarea';
  value = input.value;
} else if ((input = q('input[type=file]'))) {
  kind = 'file';
} else {
  input = q('input');
  value = input ? input.value : null;
}
const required = !!(input && (input.required || input.getAttribute('aria-required') === 'true'))
  || /\*\s*$/.test(label);
return { label, kind, required, options, current_value: value || null };
"#;

/// Clicks the radio in the container whose label text is `arguments[1]`.
const CHOOSE_RADIO_JS: &str = r#"
const root = arguments[0];
for (const r of root.querySelectorAll('input[type=radio]')) {
  const l = root.querySelector(`label[for="${r.id}"]`);
  const text = (l ? l.innerText : r.value).trim();
  if (text === arguments[1]) { (l || r).click(); return true; }
}
return false;
"#;

const SCROLL_RESULTS_JS: &str = r#"
const list = document.querySelector('.jobs-search-results-list, .scaffold-layout__list');
(list || window).scrollBy(0, arguments[0]);
"#;

pub struct WebDriverPage {
    client: Client,
    elements: Mutex<HashMap<String, Element>>,
    next_id: AtomicU64,
}

impl WebDriverPage {
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self, BrowserError> {
        let mut args = vec!["--window-size=1366,900", "--disable-blink-features=AutomationControlled"];
        if headless {
            args.push("--headless=new");
        }
        let mut capabilities = serde_json::Map::new();
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(webdriver_url)
            .await
            .map_err(|e| BrowserError::Driver(format!("cannot start WebDriver session: {e}")))?;
        info!(webdriver_url, headless, "WebDriver session started");

        Ok(Self {
            client,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn close(&self) -> Result<(), BrowserError> {
        self.client.clone().close().await.map_err(driver_error)
    }

    fn register(&self, element: Element) -> ElementHandle {
        let id = format!("el-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut elements) = self.elements.lock() {
            elements.insert(id.clone(), element);
        }
        ElementHandle::new(id)
    }

    fn element(&self, handle: &ElementHandle) -> Result<Element, BrowserError> {
        self.elements
            .lock()
            .map_err(|_| BrowserError::Driver("element registry poisoned".to_string()))?
            .get(handle.id())
            .cloned()
            .ok_or_else(|| BrowserError::Stale(handle.id().to_string()))
    }

    /// The first control matching `css` inside a field container.
    async fn control(&self, field: &ElementHandle, css: &str) -> Result<Element, BrowserError> {
        self.element(field)?
            .find(Locator::Css(css))
            .await
            .map_err(driver_error)
    }
}

fn driver_error(e: CmdError) -> BrowserError {
    let message = e.to_string();
    if message.contains("stale element") {
        BrowserError::Stale(message)
    } else if e.is_no_such_element() {
        BrowserError::Timeout(message)
    } else {
        BrowserError::Driver(message)
    }
}

fn found(result: Result<Element, CmdError>) -> Result<Option<Element>, BrowserError> {
    match result {
        Ok(element) => Ok(Some(element)),
        Err(e) if e.is_no_such_element() => Ok(None),
        Err(e) => Err(driver_error(e)),
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "Navigating");
        if let Ok(mut elements) = self.elements.lock() {
            elements.clear();
        }
        self.client.goto(url).await.map_err(driver_error)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.client
            .current_url()
            .await
            .map(String::from)
            .map_err(driver_error)
    }

    async fn locate(&self, intent: SelectorIntent) -> Result<Option<ElementHandle>, BrowserError> {
        let element = found(self.client.find(query_for(intent).locator()).await)?;
        Ok(element.map(|e| self.register(e)))
    }

    async fn locate_all(&self, intent: SelectorIntent) -> Result<Vec<ElementHandle>, BrowserError> {
        let elements = self
            .client
            .find_all(query_for(intent).locator())
            .await
            .map_err(driver_error)?;
        Ok(elements.into_iter().map(|e| self.register(e)).collect())
    }

    async fn locate_within(
        &self,
        parent: &ElementHandle,
        intent: SelectorIntent,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        let parent = self.element(parent)?;
        let element = found(parent.find(query_for(intent).locator()).await)?;
        Ok(element.map(|e| self.register(e)))
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        self.element(element)?.text().await.map_err(driver_error)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.element(element)?.attr(name).await.map_err(driver_error)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.element(element)?.click().await.map_err(driver_error)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError> {
        self.client
            .execute(SCROLL_RESULTS_JS, vec![json!(pixels)])
            .await
            .map(|_| ())
            .map_err(driver_error)
    }

    async fn describe_field(&self, field: &ElementHandle) -> Result<RawField, BrowserError> {
        let element = self.element(field)?;
        let arg = serde_json::to_value(&element)
            .map_err(|e| BrowserError::Driver(format!("cannot pass element to script: {e}")))?;
        let value: Value = self
            .client
            .execute(DESCRIBE_FIELD_JS, vec![arg])
            .await
            .map_err(driver_error)?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::Driver(format!("unexpected field description: {e}")))
    }

    async fn clear_field(&self, field: &ElementHandle) -> Result<(), BrowserError> {
        self.control(field, "input, textarea")
            .await?
            .clear()
            .await
            .map_err(driver_error)
    }

    async fn type_text(&self, field: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.control(field, "input, textarea")
            .await?
            .send_keys(text)
            .await
            .map_err(driver_error)
    }

    async fn choose_option(
        &self,
        field: &ElementHandle,
        option: &str,
    ) -> Result<(), BrowserError> {
        let described = self.describe_field(field).await?;
        match described.kind {
            InputKind::Select => self
                .control(field, "select")
                .await?
                .select_by_label(option)
                .await
                .map_err(driver_error),
            InputKind::Radio => {
                let element = self.element(field)?;
                let arg = serde_json::to_value(&element)
                    .map_err(|e| BrowserError::Driver(e.to_string()))?;
                let clicked = self
                    .client
                    .execute(CHOOSE_RADIO_JS, vec![arg, json!(option)])
                    .await
                    .map_err(driver_error)?;
                if clicked.as_bool() == Some(true) {
                    Ok(())
                } else {
                    Err(BrowserError::NotInteractable {
                        element: field.id().to_string(),
                        action: format!("option '{option}'"),
                    })
                }
            }
            other => Err(BrowserError::NotInteractable {
                element: field.id().to_string(),
                action: format!("option selection on a {} input", other.as_str()),
            }),
        }
    }

    async fn set_checked(&self, field: &ElementHandle, checked: bool) -> Result<(), BrowserError> {
        let checkbox = self.control(field, "input[type=checkbox]").await?;
        let current = checkbox.is_selected().await.map_err(driver_error)?;
        if current != checked {
            // The input itself is often visually hidden behind its label.
            match found(self.element(field)?.find(Locator::Css("label")).await)? {
                Some(label) => label.click().await.map_err(driver_error)?,
                None => checkbox.click().await.map_err(driver_error)?,
            }
        }
        Ok(())
    }

    async fn attach_file(&self, field: &ElementHandle, path: &Path) -> Result<(), BrowserError> {
        let absolute = std::fs::canonicalize(path).map_err(|e| {
            BrowserError::Driver(format!("cannot resolve {}: {e}", path.display()))
        })?;
        self.control(field, "input[type=file]")
            .await?
            .send_keys(&absolute.display().to_string())
            .await
            .map_err(driver_error)
    }
}
