use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracko_agents::FallbackResponder;
use tracko_core::NlpResult;

const DEEPSEEK_ENDPOINT: &str = "https://api.deepseek.com/chat/completions";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const EMPTY_COMPLETION: &str = "No detailed response available.";

/// Forwards unmatched messages to the DeepSeek chat-completions API.
#[derive(Debug, Clone)]
pub struct DeepSeekFallback {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl DeepSeekFallback {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: DEEPSEEK_ENDPOINT.to_string(),
            model: DEEPSEEK_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl FallbackResponder for DeepSeekFallback {
    async fn respond(&self, message: &str, _nlp: &NlpResult) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": message }],
            "stream": false
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .context("DeepSeek request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("DeepSeek non-success status {}: {}", status.as_u16(), body);
        }

        let body: serde_json::Value = response.json().await.context("DeepSeek parse failed")?;
        Ok(completion_text(&body).unwrap_or_else(|| EMPTY_COMPLETION.to_string()))
    }
}

fn completion_text(body: &serde_json::Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}
