use async_trait::async_trait;
use courier_common::{ConversationTurn, Error, Result};
use reqwest::Client;
use serde_json::json;

use crate::backend::{chat_messages, ChatBackend, FragmentStream};
use crate::sse;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Incremental backend speaking the OpenAI chat-completions SSE protocol.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn backend_id(&self) -> &str {
        "openai"
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
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("openai request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("openai api error: {error_text}")));
        }

        Ok(sse::fragments_from_sse(response, chat_completion_delta))
    }
}

/// Pull the text delta out of one chat-completions stream chunk.
/// Also used by the Azure adapter, which emits the same chunk shape.
pub(crate) fn chat_completion_delta(json: &serde_json::Value) -> Option<String> {
    json["choices"][0]["delta"]["content"]
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::chat_completion_delta;
    use serde_json::json;

    #[test]
    fn extracts_content_delta() {
        let chunk = json!({"choices": [{"delta": {"content": "Hi"}, "finish_reason": null}]});
        assert_eq!(chat_completion_delta(&chunk), Some("Hi".to_string()));
    }

    #[test]
    fn ignores_finish_and_usage_chunks() {
        let finish = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
        assert_eq!(chat_completion_delta(&finish), None);

        let usage = json!({"choices": [], "usage": {"prompt_tokens": 1}});
        assert_eq!(chat_completion_delta(&usage), None);
    }
}
