//! Sub-task launching for `start` actions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::errors::ActionError;

#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Starts `task_id` with the caller's variables and returns the
    /// launcher's response.
    async fn launch(&self, task_id: &str, variables: Map<String, Value>) -> Result<Value, ActionError>;
}

/// Launcher used when no task API is configured; every `start` fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLauncher;

#[async_trait]
impl TaskLauncher for DisabledLauncher {
    async fn launch(&self, task_id: &str, _variables: Map<String, Value>) -> Result<Value, ActionError> {
        Err(ActionError::Launch(format!(
            "cannot start `{task_id}`: no task API configured"
        )))
    }
}

/// Posts `{"variables": ...}` to `{base}/api/tasks/{id}/run`.
#[derive(Debug, Clone)]
pub struct HttpTaskLauncher {
    client: Client,
    base_url: Url,
}

impl HttpTaskLauncher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ActionError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|err| ActionError::Launch(format!("invalid task API URL `{base_url}`: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ActionError::Launch(err.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn run_url(&self, task_id: &str) -> Result<Url, ActionError> {
        let mut url = self.base_url.join("api/tasks/").map_err(|err| ActionError::Launch(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ActionError::Launch("task API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(task_id)
            .push("run");
        Ok(url)
    }
}

#[async_trait]
impl TaskLauncher for HttpTaskLauncher {
    async fn launch(&self, task_id: &str, variables: Map<String, Value>) -> Result<Value, ActionError> {
        let url = self.run_url(task_id)?;
        debug!(%url, task_id, "Posting sub-task run request");

        let response = self
            .client
            .post(url.clone())
            .json(&json!({ "variables": variables }))
            .send()
            .await
            .map_err(|err| ActionError::Launch(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, task_id, "Sub-task launch rejected");
            return Err(ActionError::Launch(format!(
                "task API returned {status}: {}",
                body.trim()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ActionError::Launch(err.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
