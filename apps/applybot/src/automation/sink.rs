//! Application log sink: one row per outcome: timestamp, title, company, status, reason.
//!
//! Append only. A sink failure is logged by the caller and never stops the run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::automation::models::{ApplicationOutcome, ReasonCode};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET_RANGE: &str = "Sheet1!A:E";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[async_trait]
pub trait ApplicationLogSink: Send + Sync {
    async fn append(&self, outcome: &ApplicationOutcome) -> Result<(), SinkError>;
}

/// Column values for one outcome, in sheet order.
pub fn outcome_row(outcome: &ApplicationOutcome) -> [String; 5] {
    [
        outcome.timestamp.to_rfc3339(),
        outcome.title.clone(),
        outcome.company.clone(),
        outcome.status.as_str().to_string(),
        outcome
            .reason
            .map(ReasonCode::as_str)
            .unwrap_or_default()
            .to_string(),
    ]
}

/// Appends rows to a Google Sheet through the `values:append` endpoint.
pub struct SheetsLogSink {
    client: Client,
    sheet_id: String,
    token: String,
}

impl SheetsLogSink {
    pub fn new(sheet_id: String, token: String) -> Result<Self, SinkError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(20))
                .build()?,
            sheet_id,
            token,
        })
    }

    fn append_url(&self) -> String {
        format!(
            "{SHEETS_API_URL}/{}/values/{SHEET_RANGE}:append",
            self.sheet_id
        )
    }

    /// Cells are stored as sent: titles starting with `=` or `+` must not become formulas.
    fn append_request(&self, outcome: &ApplicationOutcome) -> reqwest::RequestBuilder {
        self.client
            .post(self.append_url())
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": [outcome_row(outcome)] }))
    }
}

#[async_trait]
impl ApplicationLogSink for SheetsLogSink {
    async fn append(&self, outcome: &ApplicationOutcome) -> Result<(), SinkError> {
        let response = self.append_request(outcome).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SinkError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Sink used when no sheet is configured: rows go to the log only.
pub struct LocalLogSink;

#[async_trait]
impl ApplicationLogSink for LocalLogSink {
    async fn append(&self, outcome: &ApplicationOutcome) -> Result<(), SinkError> {
        let [timestamp, title, company, status, reason] = outcome_row(outcome);
        info!(%timestamp, %title, %company, %status, %reason, "Application logged");
        Ok(())
    }
}
