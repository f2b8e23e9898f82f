pub mod error;
pub mod turn;
pub mod types;

pub use error::{Error, Result};
pub use turn::ConversationTurn;
pub use types::{ChatId, UserId};
