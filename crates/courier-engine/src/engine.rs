use std::sync::Arc;
use std::time::Duration;

use courier_common::{ChatId, ConversationTurn, UserId};
use courier_history::HistoryStore;
use courier_providers::BackendRegistry;
use futures::StreamExt;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::active_model::ActiveModel;
use crate::delivery::DeliverySink;
use crate::error::TurnError;
use crate::scheduler::{ChunkScheduler, MESSAGE_CEILING};
use crate::transport::ChatTransport;

/// How often the typing indicator is refreshed while the stream runs.
const TYPING_KEEPALIVE: Duration = Duration::from_secs(4);

/// Defensive caps on a single turn. A breached cap aborts the stream but
/// still flushes and commits whatever was produced.
#[derive(Debug, Clone)]
pub struct TurnLimits {
    pub message_ceiling: usize,
    pub max_stream_duration: Duration,
    pub max_response_chars: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            message_ceiling: MESSAGE_CEILING,
            max_stream_duration: Duration::from_secs(300),
            max_response_chars: 128 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub response_chars: usize,
    pub message_sent: bool,
    pub committed: bool,
    /// Set when the stream ended early (backend error, deadline, size cap)
    /// and the delivered text is a prefix of the full answer.
    pub truncated: bool,
}

/// Orchestrates one turn: resolve the active model, open the fragment
/// stream, drive the scheduler, commit the delivered text.
pub struct ChatEngine {
    registry: Arc<BackendRegistry>,
    history: Arc<HistoryStore>,
    transport: Arc<dyn ChatTransport>,
    active: ActiveModel,
    limits: TurnLimits,
}

impl ChatEngine {
    pub fn new(
        registry: Arc<BackendRegistry>,
        history: Arc<HistoryStore>,
        transport: Arc<dyn ChatTransport>,
        default_model: Option<String>,
        limits: TurnLimits,
    ) -> Self {
        let initial = default_model.filter(|model| {
            let configured = registry.resolve(model).is_some();
            if !configured {
                warn!("default model '{model}' has no configured backend, starting without one");
            }
            configured
        });
        Self {
            registry,
            history,
            transport,
            active: ActiveModel::new(initial),
            limits,
        }
    }

    pub async fn active_model(&self) -> Option<String> {
        self.active.snapshot().await
    }

    pub fn available_models(&self) -> Vec<String> {
        self.registry.available_models()
    }

    /// Switch the model answering future turns. Validates the name against
    /// configured families and clears the switching user's history, since
    /// the old context was produced under a different model.
    pub async fn switch_active_model(&self, user: UserId, name: &str) -> Result<(), TurnError> {
        if !self.registry.knows_model(name) {
            return Err(TurnError::UnknownModel(name.to_string()));
        }
        self.history
            .clear(user)
            .map_err(|e| TurnError::History(e.to_string()))?;
        self.active.set(name.to_string()).await;
        info!(user = user.0, model = name, "switched active model");
        Ok(())
    }

    pub fn clear_history(&self, user: UserId) -> Result<usize, TurnError> {
        self.history
            .clear(user)
            .map_err(|e| TurnError::History(e.to_string()))
    }

    /// Run one conversation turn end to end.
    ///
    /// The active model is snapshotted once here; a switch landing mid-turn
    /// affects only turns that start after it.
    pub async fn run_turn(
        &self,
        user: UserId,
        chat: ChatId,
        prompt: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let model = self
            .active
            .snapshot()
            .await
            .ok_or(TurnError::NoBackendConfigured)?;
        let backend = self
            .registry
            .resolve(&model)
            .ok_or(TurnError::NoBackendConfigured)?;

        let history = self
            .history
            .read(user)
            .map_err(|e| TurnError::History(e.to_string()))?;

        if let Err(e) = self.transport.notify_typing(chat).await {
            debug!("typing notification failed: {e}");
        }

        info!(
            user = user.0,
            model = %model,
            history_turns = history.len(),
            "starting turn"
        );

        let mut stream = backend
            .open(&model, prompt, &history)
            .await
            .map_err(|e| TurnError::Stream(e.to_string()))?;

        let sink = DeliverySink::new(self.transport.clone(), chat);
        let mut scheduler = ChunkScheduler::new(&sink, self.limits.message_ceiling);

        let deadline = Instant::now() + self.limits.max_stream_duration;
        let mut typing = interval_at(Instant::now() + TYPING_KEEPALIVE, TYPING_KEEPALIVE);
        let mut stream_error: Option<String> = None;

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(fragment)) => {
                        scheduler.feed(&fragment).await;
                        if scheduler.total_chars() > self.limits.max_response_chars {
                            stream_error = Some(format!(
                                "response exceeded {} chars",
                                self.limits.max_response_chars
                            ));
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    stream_error = Some("stream deadline exceeded".into());
                    break;
                }
                _ = typing.tick() => {
                    if let Err(e) = self.transport.notify_typing(chat).await {
                        debug!("typing keepalive failed: {e}");
                    }
                }
            }
        }

        if let Some(reason) = &stream_error {
            warn!(user = user.0, "stream ended early: {reason}");
        }

        let summary = scheduler.finish().await;

        if summary.shown.is_empty() {
            if summary.total_chars == 0 {
                return match stream_error {
                    Some(reason) => Err(TurnError::Stream(reason)),
                    None => Err(TurnError::EmptyResponse),
                };
            }
            return Err(TurnError::Delivery(format!(
                "no flush reached the chat ({} failed)",
                summary.failed_flushes
            )));
        }

        let response_chars = summary.shown.chars().count();
        // Commit exactly what the user saw, not what the backend produced.
        let committed = match self
            .history
            .append(&ConversationTurn::new(user, prompt, summary.shown))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(user = user.0, "failed to record turn: {e}");
                false
            }
        };

        info!(
            user = user.0,
            response_chars,
            failed_flushes = summary.failed_flushes,
            "turn finished"
        );

        Ok(TurnOutcome {
            response_chars,
            message_sent: summary.message_sent,
            committed,
            truncated: stream_error.is_some(),
        })
    }
}
