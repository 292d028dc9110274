//! Remote endpoint implementations

pub mod openai;
pub mod mock;

// Re-export for convenience
pub use openai::{download_image, OpenAiTransport, Transport};
pub use mock::ScriptedTransport;
