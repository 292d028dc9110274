pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod envelope;
pub mod failover;
pub mod conversation;
pub mod client;
pub mod store;
pub mod recorder;
pub mod batch;
use serde::{Deserialize, Serialize};

/*

gptrec wraps the OpenAI completion/edit/image/chat endpoints with a
bounded retry loop, keeps one remembered assistant turn for chat, logs
every answered prompt to append-only JSON-lines files, and replays
queues of prompts in batch while skipping what was already answered.

gptrec/
├── Cargo.toml
├── src/
│   ├── lib.rs           # Re-exports, TaskKind, PromptRecord
│   ├── error.rs         # Error enum
│   ├── config.rs        # Client / log / batch configuration
│   ├── request.rs       # Payload builder
│   ├── envelope.rs      # Success-or-error response envelopes
│   ├── failover.rs      # Retry policy and sleepers
│   ├── conversation.rs  # Depth-one chat memory
│   ├── client.rs        # Retrying client, Generate trait
│   ├── providers/
│   │   ├── mod.rs
│   │   ├── openai.rs    # reqwest transport, image download
│   │   └── mock.rs      # scripted transport
│   ├── store.rs         # JSON-lines record store
│   ├── recorder.rs      # Prompt log + recording client
│   └── batch.rs         # Batch runner
└── tests/

*/

pub use batch::{load_queue, BatchRunner, QueueRow};
pub use client::{Client, Generate};
pub use config::{BatchConfig, ClientConfig, GptrecConfig, LogConfig};
pub use conversation::ConversationState;
pub use envelope::{Choice, Envelope};
pub use error::{Error, Result};
pub use recorder::{PromptLog, RecordingClient};
pub use request::{ChatMessage, RequestOptions, RequestPayload};

/// Kinds of work the remote API can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind
{   /// Plain text completion
    Text
  , /// Code completion
    Code
  , /// Multi-turn chat
    Chat
  , /// Image from a prompt
    ImageGen
  , /// Edit an existing image
    ImageEdit
  , /// Rewrite text following an instruction
    Edit
}

impl TaskKind
{   pub const ALL: [TaskKind; 6] = [
      TaskKind::Text
    , TaskKind::Code
    , TaskKind::Chat
    , TaskKind::ImageGen
    , TaskKind::ImageEdit
    , TaskKind::Edit
    ];

    /// Fixed model per kind
    pub fn model(self) -> &'static str
    {   match self
        {   TaskKind::Text => "text-davinci-003"
          , TaskKind::Code => "code-davinci-002"
          , TaskKind::Chat => "gpt-3.5-turbo"
          , TaskKind::Edit => "text-davinci-edit-001"
          , TaskKind::ImageGen | TaskKind::ImageEdit => "dall-e-2"
        }
    }

    /// Path below the API base
    pub fn endpoint(self) -> &'static str
    {   use crate::providers::openai as ep;
        match self
        {   TaskKind::Text | TaskKind::Code => ep::COMPLETIONS
          , TaskKind::Chat => ep::CHAT_COMPLETIONS
          , TaskKind::Edit => ep::EDITS
          , TaskKind::ImageGen => ep::IMAGE_GENERATIONS
          , TaskKind::ImageEdit => ep::IMAGE_EDITS
        }
    }

    /// Tag written to the prompt index
    pub fn label(self) -> &'static str
    {   match self
        {   TaskKind::Text => "text"
          , TaskKind::Code => "code"
          , TaskKind::Chat => "chat"
          , TaskKind::ImageGen => "image_gen"
          , TaskKind::ImageEdit => "image_edit"
          , TaskKind::Edit => "edit"
        }
    }

    /// Queue `type` column: "code" is code, anything else is text
    pub fn from_queue_type(s: &str) -> TaskKind
    {   if s == "code"
        {   TaskKind::Code
        } else
        {   TaskKind::Text
        }
    }
}

/// One queued prompt as the batch runner sees it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptRecord
{   pub prompt: String
  , pub task_kind: TaskKind
  , pub redo: bool
}

impl PromptRecord
{   pub fn new(
      prompt: impl Into<String>
    , task_kind: TaskKind
    , redo: bool
    ) -> Self
    {   PromptRecord
        {   prompt: prompt.into()
          , task_kind
          , redo
        }
    }
}
