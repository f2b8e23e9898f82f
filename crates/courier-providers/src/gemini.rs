use async_trait::async_trait;
use courier_common::{ConversationTurn, Error, Result};
use futures::stream;
use reqwest::Client;
use serde_json::json;

use crate::backend::{ChatBackend, FragmentStream};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Whole-answer backend for the Google Gemini generateContent API.
/// The returned stream yields exactly one fragment, then ends.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn backend_id(&self) -> &str {
        "gemini"
    }

    async fn open(
        &self,
        model: &str,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<FragmentStream> {
        // Gemini uses "model" instead of "assistant" for the responder role.
        let mut contents = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            contents.push(json!({"role": "user", "parts": [{"text": turn.prompt}]}));
            contents.push(json!({"role": "model", "parts": [{"text": turn.response}]}));
        }
        contents.push(json!({"role": "user", "parts": [{"text": prompt}]}));

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .client
            .post(url)
            .json(&json!({"contents": contents}))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("gemini api error: {error_text}")));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("failed to parse gemini response: {e}")))?;

        let answer = extract_answer(&raw);
        Ok(Box::pin(stream::once(async move { Ok(answer) })))
    }
}

fn extract_answer(raw: &serde_json::Value) -> String {
    let parts = match raw["candidates"][0]["content"]["parts"].as_array() {
        Some(parts) => parts,
        None => return String::new(),
    };
    parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("")
}
