use thiserror::Error;

/// Workspace-wide error type. Each variant corresponds to one collaborator
/// boundary; provider and transport failures carry the upstream message as
/// plain text so nothing from reqwest or teloxide leaks into signatures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, Error>;
