pub mod bot;
pub mod fmt;
pub mod transport;

pub use bot::CourierBot;
pub use fmt::to_telegram_markdown;
pub use transport::TelegramTransport;
