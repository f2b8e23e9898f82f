use async_trait::async_trait;
use courier_common::ChatId;
use thiserror::Error;

/// Opaque reference to a previously sent message, usable for in-place edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Rich-text delivery; the transport applies its markup dialect.
    Markdown,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    /// The transport reports the new content is identical to what the
    /// message already shows. Not an error.
    NotModified,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused the payload (malformed markup, bad request).
    /// Candidates for a plain-text retry.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Network or service failure; retrying with different formatting
    /// will not help.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Capability over the chat service consumed by the delivery engine.
///
/// Implementations must issue operations in call order; the engine never
/// runs two operations against the same handle concurrently.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageHandle, TransportError>;

    async fn edit(
        &self,
        chat: ChatId,
        handle: MessageHandle,
        text: &str,
        format: TextFormat,
    ) -> Result<EditOutcome, TransportError>;

    async fn notify_typing(&self, chat: ChatId) -> Result<(), TransportError>;
}
