use thiserror::Error;

/// Everything a turn or a model switch can fail with. Raw backend and
/// transport errors are converted at the engine boundary; callers only see
/// this taxonomy.
#[derive(Debug, Error)]
pub enum TurnError {
    /// No active model, or the active model's family holds no credential.
    #[error("no generation backend is configured")]
    NoBackendConfigured,

    /// Switch target is not listed by any configured family.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// The backend ended its stream without producing a single character.
    #[error("the backend produced no content")]
    EmptyResponse,

    /// The fragment stream could not be opened, or failed before any
    /// content was delivered.
    #[error("stream failed: {0}")]
    Stream(String),

    /// Content was produced but not a single flush reached the chat.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// History store read or clear failure.
    #[error("history error: {0}")]
    History(String),
}
