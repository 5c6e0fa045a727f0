//! Google Calendar v3 and Google Tasks v1 over plain REST.

mod auth;
mod calendar;
mod tasks;

pub use auth::GoogleAuth;

use crate::error::{Result, ToolError};
use crate::traits::{MutationBackend, ReadBackend};
use crate::types::{Event, EventPatch, MutationOutcome, NewEvent, NewTask, Task, TaskPatch};
use async_trait::async_trait;
use auth::TokenSource;
use reqwest::{Method, Url};
use std::time::Duration;

pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const GOOGLE_TASKS_BASE_URL: &str = "https://tasks.googleapis.com/tasks/v1";

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub auth: GoogleAuth,
    /// IANA zone name attached to timed events created by the assistant.
    pub timezone: String,
    pub calendar_id: String,
    pub calendar_base_url: String,
    pub tasks_base_url: String,
    pub request_timeout: Duration,
}

impl GoogleConfig {
    pub fn new(auth: GoogleAuth, timezone: &str) -> Self {
        Self {
            auth,
            timezone: timezone.to_string(),
            calendar_id: "primary".to_string(),
            calendar_base_url: GOOGLE_CALENDAR_BASE_URL.to_string(),
            tasks_base_url: GOOGLE_TASKS_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Calendar and task backend for a single Google account.
pub struct GoogleWorkspace {
    http: reqwest::Client,
    cfg: GoogleConfig,
    tokens: TokenSource,
}

impl GoogleWorkspace {
    pub fn new(cfg: GoogleConfig) -> Result<Self> {
        if cfg.timezone.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "google timezone is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(Self {
            http,
            tokens: TokenSource::new(cfg.auth.clone()),
            cfg,
        })
    }

    fn calendar_url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.cfg.calendar_base_url, segments)
    }

    fn tasks_url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.cfg.tasks_base_url, segments)
    }

    /// Sends an authenticated request and returns the decoded JSON body
    /// (`Null` for empty bodies such as DELETE responses).
    async fn call(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let token = self.tokens.access_token(&self.http).await?;
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        tracing::debug!(%method, path = %url.path(), %status, "google api call");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            self.tokens.invalidate().await;
            return Err(ToolError::Unauthorized(format!(
                "google api rejected credentials: status={status} body={text}"
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::NotFound(format!("{} not found", url.path())));
        }
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "google api failed: status={status} body={text}"
            )));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid base url {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ToolError::InvalidArguments(format!("base url {base:?} cannot have a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn str_field(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(str::to_string)
}

#[async_trait]
impl ReadBackend for GoogleWorkspace {
    #[tracing::instrument(level = "info", skip_all, fields(days_ahead = days_ahead))]
    async fn get_calendar_events(&self, days_ahead: u32) -> Result<Vec<Event>> {
        self.list_events(days_ahead).await
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn get_tasks(&self) -> Result<Vec<Task>> {
        self.list_open_tasks().await
    }
}

#[async_trait]
impl MutationBackend for GoogleWorkspace {
    #[tracing::instrument(level = "info", skip_all)]
    async fn create_task(&self, task: &NewTask) -> Result<MutationOutcome> {
        self.insert_task(task).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(task_id = %task_id))]
    async fn edit_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
        patch: &TaskPatch,
    ) -> Result<MutationOutcome> {
        self.update_task(task_id, tasklist_id, patch).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(task_id = %task_id))]
    async fn delete_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        self.remove_task(task_id, tasklist_id).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(task_id = %task_id))]
    async fn complete_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        self.mark_task_completed(task_id, tasklist_id).await
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn create_event(&self, event: &NewEvent) -> Result<MutationOutcome> {
        self.insert_event(event).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(event_id = %event_id))]
    async fn edit_event(&self, event_id: &str, patch: &EventPatch) -> Result<MutationOutcome> {
        self.update_event(event_id, patch).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(event_id = %event_id))]
    async fn delete_event(&self, event_id: &str) -> Result<MutationOutcome> {
        self.remove_event(event_id).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use wiremock::MockServer;

    pub(crate) fn workspace_for(server: &MockServer) -> GoogleWorkspace {
        let mut cfg = GoogleConfig::new(
            GoogleAuth::AccessToken("test-token".to_string()),
            "Asia/Jerusalem",
        );
        cfg.calendar_base_url = format!("{}/calendar/v3", server.uri());
        cfg.tasks_base_url = format!("{}/tasks/v1", server.uri());
        GoogleWorkspace::new(cfg).expect("workspace builds")
    }
}
