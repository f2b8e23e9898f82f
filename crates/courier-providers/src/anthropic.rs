use async_trait::async_trait;
use courier_common::{ConversationTurn, Error, Result};
use reqwest::Client;
use serde_json::json;

use crate::backend::{chat_messages, ChatBackend, FragmentStream};
use crate::sse;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Incremental backend for the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn backend_id(&self) -> &str {
        "anthropic"
    }

    async fn open(
        &self,
        model: &str,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<FragmentStream> {
        let body = json!({
            "model": model,
            "messages": chat_messages(prompt, history),
            "max_tokens": MAX_TOKENS,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("anthropic request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "anthropic api error: {error_text}"
            )));
        }

        Ok(sse::fragments_from_sse(response, text_delta))
    }
}

/// Anthropic tags stream events with a type; only text deltas carry content.
fn text_delta(json: &serde_json::Value) -> Option<String> {
    if json["type"].as_str() != Some("content_block_delta") {
        return None;
    }
    let delta = &json["delta"];
    if delta["type"].as_str() != Some("text_delta") {
        return None;
    }
    delta["text"].as_str().map(String::from)
}
