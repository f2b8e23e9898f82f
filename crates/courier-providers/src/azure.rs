use async_trait::async_trait;
use courier_common::{ConversationTurn, Error, Result};
use reqwest::Client;
use serde_json::json;

use crate::backend::{chat_messages, ChatBackend, FragmentStream};
use crate::openai::chat_completion_delta;
use crate::sse;

const AZURE_API_VERSION: &str = "2024-02-01";

/// Incremental backend for Azure-hosted OpenAI deployments.
///
/// Same stream chunk format as OpenAI, but the model name addresses a
/// deployment in the URL and authentication uses the `api-key` header.
#[derive(Clone)]
pub struct AzureOpenAiBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    api_version: String,
}

impl AzureOpenAiBackend {
    pub fn new(api_key: String, endpoint: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: AZURE_API_VERSION.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for AzureOpenAiBackend {
    fn backend_id(&self) -> &str {
        "azure-openai"
    }

    async fn open(
        &self,
        model: &str,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<FragmentStream> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, model, self.api_version
        );
        let body = json!({
            "messages": chat_messages(prompt, history),
            "stream": true,
        });

        let response = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("azure openai request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "azure openai api error: {error_text}"
            )));
        }

        Ok(sse::fragments_from_sse(response, chat_completion_delta))
    }
}
