pub mod active_model;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod transport;

pub use active_model::ActiveModel;
pub use delivery::{DeliveryFailed, DeliverySink};
pub use engine::{ChatEngine, TurnLimits, TurnOutcome};
pub use error::TurnError;
pub use scheduler::{ChunkScheduler, DeliverySummary, MESSAGE_CEILING};
pub use transport::{ChatTransport, EditOutcome, MessageHandle, TextFormat, TransportError};
