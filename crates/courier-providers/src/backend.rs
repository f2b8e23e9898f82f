use std::pin::Pin;

use async_trait::async_trait;
use courier_common::{ConversationTurn, Result};
use futures::Stream;
use serde_json::{json, Value};

/// Lazy, finite sequence of UTF-8 text fragments produced by a backend.
///
/// Fragment boundaries carry no meaning; consumers concatenate in order.
/// An `Err` item means the stream terminated abnormally and whatever was
/// already consumed is all the content there will be.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Uniform capability over the generation backends.
///
/// Incremental backends (OpenAI, Azure, Anthropic) yield many small
/// fragments; whole-answer backends (Gemini, Groq) yield exactly one
/// fragment equal to the entire answer. The delivery scheduler never
/// branches on which kind it is talking to.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Family identifier (e.g. "openai", "anthropic").
    fn backend_id(&self) -> &str;

    /// Open a fragment stream seeded with the turn prompt and prior history.
    async fn open(
        &self,
        model: &str,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<FragmentStream>;
}

/// Build an OpenAI-style chat message array from history plus the new prompt.
/// Shared by every backend speaking the chat-completions dialect.
pub(crate) fn chat_messages(prompt: &str, history: &[ConversationTurn]) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    for turn in history {
        messages.push(json!({"role": "user", "content": turn.prompt}));
        messages.push(json!({"role": "assistant", "content": turn.response}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    messages
}
