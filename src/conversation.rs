//! Depth-one chat memory
//!
//! Only the latest assistant turn is kept. Callers wanting longer
//! history pass it explicitly through `RequestOptions::messages`.

use log::debug;
use crate::envelope::Choice;
use crate::request::ChatMessage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState
{   last: Option<ChatMessage>
}

impl ConversationState
{   pub fn new() -> Self
    {   ConversationState::default()
    }

    /// Start from a known assistant turn
    pub fn remembering(message: ChatMessage) -> Self
    {   ConversationState
        {   last: Some(message)
        }
    }

    /// Replace the remembered turn with the reply carried by `choice`.
    /// Non-chat choices leave the state untouched and return false.
    pub fn update_after_chat(&mut self, choice: &Choice) -> bool
    {   match choice.message()
        {   Some(message) => {
              debug!("Remembering assistant turn ({} chars)", message.content.len());
              self.last = Some(ChatMessage::assistant(message.content.clone()));
              true
            }
          , None => false
        }
    }

    /// The remembered turn, if any. Reading does not clear it.
    pub fn consume(&self) -> Option<&ChatMessage>
    {   self.last.as_ref()
    }

    pub fn is_empty(&self) -> bool
    {   self.last.is_none()
    }
}
