use std::sync::{Arc, LazyLock};

use courier_common::ChatId;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::{ChatTransport, EditOutcome, MessageHandle, TextFormat, TransportError};

/// Characters with markup meaning in the rich-text dialect. When a formatted
/// payload is rejected they are stripped and the text is retried plain.
static MARKUP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_`\[\]()~>#+=|{}.!-]").expect("markup pattern is valid"));

/// One flush could not be delivered even after the plain-text retry.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeliveryFailed(pub String);

/// Transport wrapper that tries rich-text delivery first and falls back to
/// stripped plain text when the payload is rejected.
pub struct DeliverySink {
    transport: Arc<dyn ChatTransport>,
    chat: ChatId,
}

impl DeliverySink {
    pub fn new(transport: Arc<dyn ChatTransport>, chat: ChatId) -> Self {
        Self { transport, chat }
    }

    pub async fn send(&self, text: &str) -> Result<MessageHandle, DeliveryFailed> {
        match self
            .transport
            .send(self.chat, text, TextFormat::Markdown)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(TransportError::Rejected(reason)) => {
                warn!("formatted send rejected ({reason}), retrying plain");
                self.transport
                    .send(self.chat, &strip_markup(text), TextFormat::Plain)
                    .await
                    .map_err(|e| DeliveryFailed(e.to_string()))
            }
            Err(e) => Err(DeliveryFailed(e.to_string())),
        }
    }

    /// Edit an open message in place. A "not modified" response is not an
    /// error: the content on screen already matches.
    pub async fn edit(&self, handle: MessageHandle, text: &str) -> Result<(), DeliveryFailed> {
        match self
            .transport
            .edit(self.chat, handle, text, TextFormat::Markdown)
            .await
        {
            Ok(EditOutcome::Edited) => Ok(()),
            Ok(EditOutcome::NotModified) => {
                debug!("edit reported no change");
                Ok(())
            }
            Err(TransportError::Rejected(reason)) => {
                warn!("formatted edit rejected ({reason}), retrying plain");
                self.transport
                    .edit(self.chat, handle, &strip_markup(text), TextFormat::Plain)
                    .await
                    .map(|_| ())
                    .map_err(|e| DeliveryFailed(e.to_string()))
            }
            Err(e) => Err(DeliveryFailed(e.to_string())),
        }
    }
}

fn strip_markup(text: &str) -> String {
    MARKUP_CHARS.replace_all(text, "").into_owned()
}
