//! Request payload construction for every task kind
//!
//! Everything here is pure: no network, no clock, no files.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use log::trace;
use crate::TaskKind;

pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_N: u32 = 1;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// One chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

impl ChatMessage
{   pub fn user(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "user".to_string()
          , content: content.into()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "assistant".to_string()
          , content: content.into()
        }
    }

    pub fn system(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "system".to_string()
          , content: content.into()
        }
    }
}

/// Per-call knobs; `None` falls back to the defaults above
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions
{   /// Sampling temperature, passed through unvalidated
    pub temperature: Option<f64>
  , /// Max tokens to generate
    pub max_tokens: Option<u32>
  , /// Number of candidates
    pub n: Option<u32>
  , /// Edit instruction
    pub instruction: Option<String>
  , /// Source image for image edits
    pub image: Option<String>
  , /// Optional mask for image edits
    pub mask: Option<String>
  , /// Image size such as "512x512"
    pub size: Option<String>
  , /// Extra chat history placed before the new user turn
    pub messages: Vec<ChatMessage>
}

impl RequestOptions
{   pub fn temperature(mut self, t: f64) -> Self
    {   self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = Some(max_tokens);
        self
    }

    pub fn n(mut self, n: u32) -> Self
    {   self.n = Some(n);
        self
    }

    pub fn instruction(mut self, s: impl Into<String>) -> Self
    {   self.instruction = Some(s.into());
        self
    }

    pub fn image(mut self, s: impl Into<String>) -> Self
    {   self.image = Some(s.into());
        self
    }

    pub fn mask(mut self, s: impl Into<String>) -> Self
    {   self.mask = Some(s.into());
        self
    }

    pub fn size(mut self, s: impl Into<String>) -> Self
    {   self.size = Some(s.into());
        self
    }

    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self
    {   self.messages = messages;
        self
    }
}

/// Wire body: model plus task-specific fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPayload
{   pub model: String
  , #[serde(flatten)]
    pub fields: Map<String, Value>
}

impl RequestPayload
{   pub fn get(&self, field: &str) -> Option<&Value>
    {   self.fields.get(field)
    }

    /// Chat messages carried by this payload, if any
    pub fn messages(&self) -> Option<Vec<ChatMessage>>
    {   self.fields.get("messages")
          .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The text the caller asked about: prompt, edit input, or the
    /// newest chat turn
    pub fn primary_input(&self) -> Option<String>
    {   if let Some(Value::String(s)) = self.fields.get("prompt")
        {   return Some(s.clone());
        }
        if let Some(Value::String(s)) = self.fields.get("input")
        {   return Some(s.clone());
        }
        self.messages()
          .and_then(|m| m.last().map(|turn| turn.content.clone()))
    }

    pub fn to_json(&self) -> Value
    {   let mut body = self.fields.clone();
        body.insert("model".to_string(), json!(self.model));
        Value::Object(body)
    }
}

/// Build a payload with no remembered chat turn
pub fn build(
  kind: TaskKind
, input: &str
, options: &RequestOptions
) -> RequestPayload
{   build_with_memory(kind, input, options, None)
}

/// Build a payload; for chat, `remembered` goes first and the new
/// user turn last
pub fn build_with_memory(
  kind: TaskKind
, input: &str
, options: &RequestOptions
, remembered: Option<&ChatMessage>
) -> RequestPayload
{   let temperature
      = options.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let n = options.n.unwrap_or(DEFAULT_N);
    let size = options.size.clone()
      .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());

    let mut fields = Map::new();
    match kind
    {   TaskKind::Text | TaskKind::Code => {
          fields.insert("prompt".into(), json!(input));
          fields.insert("temperature".into(), json!(temperature));
          fields.insert(
            "max_tokens".into(),
            json!(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
          );
          fields.insert("n".into(), json!(n));
        }
      , TaskKind::Edit => {
          fields.insert("input".into(), json!(input));
          fields.insert(
            "instruction".into(),
            json!(options.instruction.clone().unwrap_or_default())
          );
          fields.insert("temperature".into(), json!(temperature));
          fields.insert("n".into(), json!(n));
        }
      , TaskKind::ImageGen => {
          fields.insert("prompt".into(), json!(input));
          fields.insert("n".into(), json!(n));
          fields.insert("size".into(), json!(size));
        }
      , TaskKind::ImageEdit => {
          fields.insert("prompt".into(), json!(input));
          fields.insert(
            "image".into(),
            json!(options.image.clone().unwrap_or_default())
          );
          if let Some(mask) = &options.mask
          {   fields.insert("mask".into(), json!(mask));
          }
          fields.insert("n".into(), json!(n));
          fields.insert("size".into(), json!(size));
        }
      , TaskKind::Chat => {
          let mut messages: Vec<ChatMessage> = Vec::with_capacity(
            options.messages.len() + 2
          );
          if let Some(turn) = remembered
          {   messages.push(turn.clone());
          }
          messages.extend(options.messages.iter().cloned());
          messages.push(ChatMessage::user(input));
          fields.insert("messages".into(), json!(messages));
          fields.insert("temperature".into(), json!(temperature));
          fields.insert("n".into(), json!(n));
          if let Some(max_tokens) = options.max_tokens
          {   fields.insert("max_tokens".into(), json!(max_tokens));
          }
        }
    }

    let payload = RequestPayload
    {   model: kind.model().to_string()
      , fields
    };
    trace!("Built {:?} payload: {:?}", kind, payload);
    payload
}
