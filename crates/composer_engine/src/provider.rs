use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use composer_core::{GenerationRequest, ProviderKind, Submission};
use engine_logging::{engine_debug, engine_info};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{map_reqwest_error, status_error, ProviderError};

/// Connection settings for one remote generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Minimum time between two status checks of the same job; zero disables.
    pub min_poll_delay_ms: u64,
    /// HEAD / ranged GET the result URL before accepting it.
    pub probe_results: bool,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            min_poll_delay_ms: 0,
            probe_results: false,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Remote generation service: accepts a request and reports on the task later.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn min_poll_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn probe_results(&self) -> bool {
        false
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError>;

    /// Raw status document; interpreted by [`crate::normalize`].
    async fn check_status(&self, remote_task_id: &str) -> Result<Value, ProviderError>;
}

/// JSON-over-HTTP provider: `POST {base}/tasks` and `GET {base}/tasks/{id}`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    kind: ProviderKind,
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(kind: ProviderKind, settings: ProviderSettings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|err| ProviderError::Failure(err.to_string()))?;
        Ok(Self {
            kind,
            settings,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.settings.api_token.as_deref() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| ProviderError::Decode(err.to_string()))
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn min_poll_delay(&self) -> Duration {
        Duration::from_millis(self.settings.min_poll_delay_ms)
    }

    fn probe_results(&self) -> bool {
        self.settings.probe_results
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let body = json!({
            "kind": request.kind().as_str(),
            "prompt": request.prompt,
            "style": request.style,
        });
        let builder = self
            .client
            .post(self.endpoint("tasks"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body.to_string());
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let value = Self::read_json(response).await?;
        let submission = submission_from(&value)?;
        engine_info!("{} accepted request: {:?}", self.kind, submission);
        Ok(submission)
    }

    async fn check_status(&self, remote_task_id: &str) -> Result<Value, ProviderError> {
        let builder = self
            .client
            .get(self.endpoint(&format!("tasks/{remote_task_id}")))
            .header(ACCEPT, "application/json");
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let value = Self::read_json(response).await?;
        engine_debug!("{} status for {}: {}", self.kind, remote_task_id, value);
        Ok(value)
    }
}

const TASK_ID_POINTERS: &[&str] = &[
    "/taskId",
    "/task_id",
    "/data/taskId",
    "/data/task_id",
    "/request_id",
    "/id",
];

const READY_URL_POINTERS: &[&str] = &["/resultUrl", "/result_url", "/data/resultUrl", "/url"];

/// Reads the task id (or an immediately available result) out of a submit response.
pub fn submission_from(value: &Value) -> Result<Submission, ProviderError> {
    if let Some(url) = first_text(value, READY_URL_POINTERS) {
        return Ok(Submission::Ready(url));
    }
    if let Some(task) = first_text(value, TASK_ID_POINTERS) {
        return Ok(Submission::RemoteTask(task));
    }
    Err(ProviderError::Decode(format!(
        "submit response has neither a task id nor a result url: {value}"
    )))
}

fn first_text(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| match value.pointer(pointer)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// The configured providers, looked up by kind.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn GenerationProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one [`HttpProvider`] per configured entry.
    pub fn from_settings(
        settings: &BTreeMap<ProviderKind, ProviderSettings>,
    ) -> Result<Self, ProviderError> {
        let mut set = Self::new();
        for (kind, settings) in settings {
            set.insert(Arc::new(HttpProvider::new(*kind, settings.clone())?));
        }
        Ok(set)
    }

    pub fn insert(&mut self, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.insert(provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.providers.keys().collect();
        kinds.sort();
        f.debug_struct("ProviderSet").field("providers", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_prefers_ready_url() {
        let value = json!({"taskId": "T1", "resultUrl": "https://cdn.example.com/a.png"});
        assert_eq!(
            submission_from(&value),
            Ok(Submission::Ready("https://cdn.example.com/a.png".into()))
        );
    }

    #[test]
    fn submission_reads_nested_and_numeric_ids() {
        assert_eq!(
            submission_from(&json!({"data": {"taskId": "abc"}})),
            Ok(Submission::RemoteTask("abc".into()))
        );
        assert_eq!(
            submission_from(&json!({"id": 42})),
            Ok(Submission::RemoteTask("42".into()))
        );
        assert!(matches!(
            submission_from(&json!({"ok": true})),
            Err(ProviderError::Decode(_))
        ));
    }
}
