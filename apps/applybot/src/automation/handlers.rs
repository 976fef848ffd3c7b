use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::automation::reporter::{ProgressEvent, RunReporter, RunSnapshot};
use crate::automation::run_config::{RunConfigInput, RunConfiguration, Secret};
use crate::automation::session::JobSessionController;
use crate::automation::sink::{ApplicationLogSink, LocalLogSink, SheetsLogSink};
use crate::automation::timing::TimingSimulator;
use crate::automation::webdriver::WebDriverPage;
use crate::errors::AppError;
use crate::state::{ActiveRun, AppState};

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub state: &'static str,
    pub max_applications: u32,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum RunStatus {
    Idle {
        state: &'static str,
        progress: u8,
        events: Vec<ProgressEvent>,
    },
    Active(RunSnapshot),
}

/// Text fields plus the uploaded resume, as read from the start-run form.
#[derive(Default)]
struct StartRunForm {
    fields: HashMap<String, String>,
    resume: Option<(String, Vec<u8>)>,
}

impl StartRunForm {
    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// `jobTypes` / `workMode` arrive as JSON lists of labels.
    fn list(&self, name: &str) -> Result<Vec<String>, AppError> {
        match self.fields.get(name).map(|raw| raw.trim()) {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|_| {
                AppError::Validation(format!("{name} must be a JSON list of strings"))
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/runs
pub async fn handle_start_run(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RunStarted>), AppError> {
    let form = read_form(multipart).await?;

    let mut current = state.current_run.lock().await;
    if current.as_ref().is_some_and(|run| run.reporter.is_running()) {
        return Err(AppError::Conflict(
            "An application run is already in progress".to_string(),
        ));
    }

    let resume_path = match &form.resume {
        Some((file_name, bytes)) => {
            Some(save_resume(&state.config.upload_dir, file_name, bytes).await?)
        }
        None => None,
    };
    let input = RunConfigInput {
        email: form.text("linkedinEmail"),
        password: form.fields.get("linkedinPassword").map(Secret::new),
        resume_path: resume_path.clone(),
        keywords: form.text("jobKeywords"),
        location: form.text("location"),
        job_types: form.list("jobTypes")?,
        work_modes: form.list("workMode")?,
        max_applications: form.text("maxApplications"),
        sheet_id: form.fields.get("googleSheetId").cloned(),
    };
    let config = match input.validate() {
        Ok(config) => config,
        Err(issues) => {
            if let Some(path) = resume_path {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(AppError::InvalidRun(issues));
        }
    };

    let reporter = Arc::new(RunReporter::new(config.max_applications));
    let (stop_tx, stop_rx) = watch::channel(false);
    *current = Some(ActiveRun {
        reporter: reporter.clone(),
        stop: stop_tx,
    });
    drop(current);

    info!(
        cap = config.max_applications,
        keyword = config.primary_keyword(),
        "Starting application run"
    );
    let max_applications = config.max_applications;
    tokio::spawn(execute_run(state, config, reporter, stop_rx));

    Ok((
        StatusCode::ACCEPTED,
        Json(RunStarted {
            state: "running",
            max_applications,
        }),
    ))
}

/// GET /api/v1/runs/current?since=n
pub async fn handle_run_status(
    State(state): State<AppState>,
    Query(params): Query<SinceQuery>,
) -> Json<RunStatus> {
    let current = state.current_run.lock().await;
    Json(match current.as_ref() {
        Some(run) => RunStatus::Active(run.reporter.snapshot(params.since)),
        None => RunStatus::Idle {
            state: "idle",
            progress: 0,
            events: Vec::new(),
        },
    })
}

/// POST /api/v1/runs/current/stop
pub async fn handle_stop_run(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let current = state.current_run.lock().await;
    match current.as_ref() {
        Some(run) if run.reporter.is_running() => {
            run.stop.send_replace(true);
            info!("Stop requested for the current run");
            Ok(StatusCode::ACCEPTED)
        }
        _ => Err(AppError::NotFound("No application run is in progress".to_string())),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn read_form(mut multipart: Multipart) -> Result<StartRunForm, AppError> {
    let mut form = StartRunForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed form data: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "resume" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Resume upload failed: {e}")))?;
            if !bytes.is_empty() {
                form.resume = Some((file_name, bytes.to_vec()));
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Field {name} is unreadable: {e}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

/// Stores the upload under a fresh name, keeping its extension.
async fn save_resume(upload_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", upload_dir.display()))?;
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let name = match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    };
    let path = upload_dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| anyhow::anyhow!("cannot save resume to {}: {e}", path.display()))?;
    Ok(path)
}

fn sink_for(state: &AppState, config: &RunConfiguration) -> Arc<dyn ApplicationLogSink> {
    match (&config.sheet_id, &state.config.sheets_token) {
        (Some(sheet_id), Some(token)) => {
            match SheetsLogSink::new(sheet_id.clone(), token.clone()) {
                Ok(sink) => return Arc::new(sink),
                Err(e) => warn!("Sheets sink unavailable, logging locally: {e}"),
            }
        }
        (Some(_), None) => warn!("GOOGLE_SHEETS_TOKEN is not set; outcomes are logged locally"),
        _ => {}
    }
    Arc::new(LocalLogSink)
}

async fn execute_run(
    state: AppState,
    config: RunConfiguration,
    reporter: Arc<RunReporter>,
    stop: watch::Receiver<bool>,
) {
    let page = match WebDriverPage::connect(&state.config.webdriver_url, state.config.headless).await
    {
        Ok(page) => Arc::new(page),
        Err(e) => {
            reporter.fail(format!("Browser unavailable: {e}"), None);
            let _ = tokio::fs::remove_file(&config.resume_path).await;
            return;
        }
    };

    let engine = &state.config.engine;
    let controller = JobSessionController::new(page.clone(), state.llm.clone(), reporter)
        .with_sink(sink_for(&state, &config))
        .with_timing(TimingSimulator::new(engine.timing))
        .with_classifier(engine.classifier())
        .with_settings(engine.session_settings())
        .with_stop_signal(stop);

    match controller.run(&config).await {
        Ok(summary) => info!(
            submitted = summary.counts.submitted,
            terminated_early = summary.terminated_early,
            "Application run ended"
        ),
        Err(aborted) => warn!(
            attempted = aborted.summary.counts.attempted(),
            "Application run aborted: {}",
            aborted.error
        ),
    }

    if let Err(e) = page.close().await {
        warn!("Closing the browser session failed: {e}");
    }
    if let Err(e) = tokio::fs::remove_file(&config.resume_path).await {
        warn!("Removing uploaded resume failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use crate::automation::testing::ScriptedCompletion;
    use crate::config::{Config, EngineSettings};
    use crate::routes::build_router;

    const BOUNDARY: &str = "applybot-test-boundary";

    fn state(upload_dir: &Path) -> AppState {
        let config = Config {
            anthropic_api_key: "sk-test".to_string(),
            port: 0,
            rust_log: "info".to_string(),
            webdriver_url: "http://127.0.0.1:9".to_string(),
            headless: true,
            upload_dir: upload_dir.to_path_buf(),
            sheets_token: None,
            engine: EngineSettings::default(),
        };
        AppState::new(Arc::new(ScriptedCompletion::default()), config)
    }

    fn multipart_body(fields: &[(&str, &str)], resume: Option<(&str, &str)>) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some((file_name, content)) = resume {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n\
                 {content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn start_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/runs")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_form_returns_issue_list_and_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(dir.path()));
        let body = multipart_body(
            &[
                ("linkedinEmail", "not-an-email"),
                ("jobKeywords", "rust"),
                ("location", "Berlin"),
                ("jobTypes", r#"["Full-time"]"#),
                ("workMode", r#"["Remote"]"#),
                ("maxApplications", "0"),
            ],
            Some(("cv.pdf", "%PDF-1.4")),
        );

        let response = app.oneshot(start_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        let fields: Vec<&str> = json["error"]["issues"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|issue| issue["field"].as_str())
            .collect();
        assert!(fields.contains(&"linkedinEmail"));
        assert!(fields.contains(&"linkedinPassword"));
        assert!(fields.contains(&"maxApplications"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_job_types_must_be_a_json_list() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(dir.path()));
        let body = multipart_body(&[("jobTypes", "Full-time")], None);
        let response = app.oneshot(start_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_second_run_conflicts_while_one_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (stop, _) = watch::channel(false);
        *state.current_run.lock().await = Some(ActiveRun {
            reporter: Arc::new(RunReporter::new(5)),
            stop,
        });

        let response = build_router(state)
            .oneshot(start_request(multipart_body(&[], None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_status_is_idle_before_any_run() {
        let dir = tempfile::tempdir().unwrap();
        let response = build_router(state(dir.path()))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/runs/current")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "idle");
    }

    #[tokio::test]
    async fn test_stop_signals_the_active_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let reporter = Arc::new(RunReporter::new(3));
        let (stop, stop_rx) = watch::channel(false);
        *state.current_run.lock().await = Some(ActiveRun {
            reporter: reporter.clone(),
            stop,
        });

        let stop_request = || {
            Request::builder()
                .method("POST")
                .uri("/api/v1/runs/current/stop")
                .body(Body::empty())
                .unwrap()
        };
        let app = build_router(state);
        let response = app.clone().oneshot(stop_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(*stop_rx.borrow());

        reporter.fail("done", None);
        let response = app.oneshot(stop_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_reports_events_since_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let reporter = Arc::new(RunReporter::new(3));
        reporter.emit(crate::automation::reporter::Stage::Login, "Signing in");
        reporter.emit(crate::automation::reporter::Stage::Search, "Searching");
        let (stop, _) = watch::channel(false);
        *state.current_run.lock().await = Some(ActiveRun { reporter, stop });

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/runs/current?since=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["state"], "running");
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert_eq!(json["nextSince"], 2);
    }
}
