//! JSON-over-HTTP task gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{GatewayError, TaskCreate, TaskGateway, TaskRow, TaskUpdate};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct WeeksResponse {
    #[serde(rename = "weekStartsISO")]
    week_starts_iso: Vec<String>,
}

#[derive(Deserialize)]
struct TaskListResponse {
    tasks: Vec<TaskRow>,
}

#[derive(Deserialize)]
struct TaskResponse {
    task: TaskRow,
}

#[derive(Deserialize)]
struct OkResponse {
    #[serde(default = "default_ok")]
    ok: bool,
}

fn default_ok() -> bool {
    true
}

/// Gateway backed by the planner's REST API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, path: &str) -> Result<T, GatewayError> {
        let response = request.timeout(self.timeout).send().await.map_err(|error| {
            tracing::debug!(path, %error, "request failed");
            if error.is_timeout() {
                GatewayError::Transport(format!("timed out after {}ms", self.timeout.as_millis()))
            } else {
                GatewayError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(path, status = status.as_u16(), "remote rejected request");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn delete_path(&self, path: &str) -> Result<(), GatewayError> {
        let response: OkResponse = self.send(self.client.delete(self.url(path)), path).await?;
        if response.ok {
            Ok(())
        } else {
            Err(GatewayError::Decode(format!("{} answered ok=false", path)))
        }
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list_weeks(&self) -> Result<Vec<NaiveDate>, GatewayError> {
        let path = "/weeks";
        let response: WeeksResponse = self.send(self.client.get(self.url(path)), path).await?;
        response
            .week_starts_iso
            .iter()
            .map(|iso| {
                NaiveDate::parse_from_str(iso, "%Y-%m-%d")
                    .map_err(|_| GatewayError::Decode(format!("bad week start '{}'", iso)))
            })
            .collect()
    }

    async fn list_week_tasks(&self, week_start: NaiveDate) -> Result<Vec<TaskRow>, GatewayError> {
        let path = format!("/weeks/{}/tasks", week_start.format("%Y-%m-%d"));
        let response: TaskListResponse = self.send(self.client.get(self.url(&path)), &path).await?;
        Ok(response.tasks)
    }

    async fn create_task(&self, payload: &TaskCreate) -> Result<TaskRow, GatewayError> {
        let path = "/tasks";
        let response: TaskResponse = self
            .send(self.client.post(self.url(path)).json(payload), path)
            .await?;
        Ok(response.task)
    }

    async fn update_task(&self, id: &str, payload: &TaskUpdate) -> Result<TaskRow, GatewayError> {
        let path = format!("/tasks/{}", id);
        let response: TaskResponse = self
            .send(self.client.patch(self.url(&path)).json(payload), &path)
            .await?;
        Ok(response.task)
    }

    async fn delete_task(&self, id: &str) -> Result<(), GatewayError> {
        self.delete_path(&format!("/tasks/{}", id)).await
    }

    async fn delete_tasks_for_day(&self, date: NaiveDate) -> Result<(), GatewayError> {
        self.delete_path(&format!("/days/{}/tasks", date.format("%Y-%m-%d"))).await
    }

    async fn delete_tasks_for_week(&self, week_start: NaiveDate) -> Result<(), GatewayError> {
        self.delete_path(&format!("/weeks/{}/tasks", week_start.format("%Y-%m-%d"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let gateway = HttpGateway::new("http://example.test/api/", DEFAULT_TIMEOUT);
        assert_eq!(gateway.base_url(), "http://example.test/api");
        assert_eq!(gateway.url("/weeks"), "http://example.test/api/weeks");
    }

    #[test]
    fn test_weeks_response_shape() {
        let parsed: WeeksResponse =
            serde_json::from_str(r#"{"weekStartsISO": ["2025-01-12", "2025-01-05"]}"#).unwrap();
        assert_eq!(parsed.week_starts_iso.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let gateway = HttpGateway::new("http://127.0.0.1:9", Duration::from_millis(500));
        let result = gateway.list_weeks().await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}
