pub mod anthropic;
pub mod azure;
pub mod backend;
pub mod gemini;
pub mod groq;
pub mod openai;
pub mod registry;

mod sse;

pub use anthropic::AnthropicBackend;
pub use azure::AzureOpenAiBackend;
pub use backend::{ChatBackend, FragmentStream};
pub use gemini::GeminiBackend;
pub use groq::GroqBackend;
pub use openai::OpenAiBackend;
pub use registry::{BackendRegistry, ProviderFamily};
