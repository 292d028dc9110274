//! Scripted in-process transport for tests and dry runs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use serde_json::{json, Value};
use log::trace;
use crate::error::Error;
use crate::providers::openai::Transport;

#[derive(Debug, Default)]
struct Script
{   replies: VecDeque<Result<Value, Error>>
  , requests: Vec<(String, Value)>
}

/// Replays canned bodies in order and records every request.
/// Clones share the same script, so a test can keep a handle after
/// moving one into a client.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport
{   script: Arc<Mutex<Script>>
}

impl ScriptedTransport
{   pub fn new() -> Self
    {   ScriptedTransport::default()
    }

    /// Queue a raw response body
    pub fn reply(&self, body: Value) -> &Self
    {   self.push(Ok(body))
    }

    /// Queue a transport-level failure
    pub fn fail(&self, err: Error) -> &Self
    {   self.push(Err(err))
    }

    pub fn reply_text(&self, text: &str) -> &Self
    {   self.reply(json!({"choices": [{"text": text, "index": 0}]}))
    }

    pub fn reply_chat(&self, content: &str) -> &Self
    {   self.reply(json!({
          "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content}
          }]
        }))
    }

    pub fn reply_error(&self, message: &str) -> &Self
    {   self.reply(json!({"error": {"message": message, "type": "server_error"}}))
    }

    fn push(&self, reply: Result<Value, Error>) -> &Self
    {   if let Ok(mut script) = self.script.lock()
        {   script.replies.push_back(reply);
        }
        self
    }

    /// Every (endpoint, body) seen so far
    pub fn requests(&self) -> Vec<(String, Value)>
    {   self.script.lock()
          .map(|s| s.requests.clone())
          .unwrap_or_default()
    }

    pub fn calls(&self) -> usize
    {   self.requests().len()
    }

    pub fn remaining(&self) -> usize
    {   self.script.lock()
          .map(|s| s.replies.len())
          .unwrap_or_default()
    }
}

impl Transport for ScriptedTransport
{   async fn post(
      &self
    , endpoint: &str
    , body: &Value
    ) -> Result<Value, Error>
    {   let mut script = self.script.lock()
          .map_err(|_| Error::Other("script lock poisoned".to_string()))?;
        trace!("Scripted POST {}: {}", endpoint, body);
        script.requests.push((endpoint.to_string(), body.clone()));
        script.replies.pop_front()
          .unwrap_or_else(|| {
            Err(Error::HttpError("script exhausted".to_string()))
          })
    }
}
