use async_trait::async_trait;
use courier_common::{ConversationTurn, Error, Result};
use futures::stream;
use reqwest::Client;
use serde_json::json;

use crate::backend::{chat_messages, ChatBackend, FragmentStream};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

/// Whole-answer backend for Groq's OpenAI-compatible completions API.
/// The returned stream yields exactly one fragment, then ends.
#[derive(Clone)]
pub struct GroqBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GROQ_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ChatBackend for GroqBackend {
    fn backend_id(&self) -> &str {
        "groq"
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
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("groq request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("groq api error: {error_text}")));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("failed to parse groq response: {e}")))?;

        let answer = raw["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(Box::pin(stream::once(async move { Ok(answer) })))
    }
}
