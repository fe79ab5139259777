use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use a11yscan_core::collaborators::{InferenceInvoker, InferenceOutput};
use a11yscan_core::InferenceError;

/// Chat-completions invoker against an OpenAI-compatible endpoint.
/// Transport failures are classified here so the analyzer only ever sees
/// its own error taxonomy.
pub struct HttpInferenceInvoker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpInferenceInvoker {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| InferenceError::Unknown(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceInvoker for HttpInferenceInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<InferenceOutput, InferenceError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
        });

        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .timeout(timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(timeout.as_millis() as u64)
            } else if e.is_connect() {
                InferenceError::ProcessCrash(e.to_string())
            } else {
                InferenceError::Unknown(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(InferenceError::RateLimit);
        }
        if status.is_server_error() {
            return Err(InferenceError::ProcessCrash(format!("upstream {status}")));
        }
        if !status.is_success() {
            return Err(InferenceError::Unknown(format!("upstream {status}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        let output = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InferenceError::InvalidOutput("no message content".into()))?
            .to_string();
        let tokens_used = value["usage"]["total_tokens"].as_i64().unwrap_or(0);

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(duration_ms, tokens_used, "inference call finished");
        Ok(InferenceOutput {
            output,
            duration_ms,
            tokens_used,
        })
    }
}
