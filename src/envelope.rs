//! Response envelopes: exactly one of success-with-choices or
//! error-with-message

use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::{error, trace};
use crate::error::Error;
use crate::request::ChatMessage;

/// Body of `{"error": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody
{   pub message: String
  , #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>
}

impl ApiErrorBody
{   /// Never fails: whatever sits under `error` is a remote error.
    /// A non-string `message` falls back to the serialized value.
    pub fn from_value(err: Value) -> Self
    {   match err
        {   Value::String(message) => ApiErrorBody
            {   message
              , kind: None
              , code: None
            }
          , Value::Object(ref fields) => {
              let message = match fields.get("message")
              {   Some(Value::String(s)) => s.clone()
                , _ => err.to_string()
              };
              ApiErrorBody
              {   message
                , kind: fields.get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                , code: fields.get("code")
                    .filter(|c| !c.is_null())
                    .cloned()
              }
            }
          , other => ApiErrorBody
            {   message: other.to_string()
              , kind: None
              , code: None
            }
        }
    }
}

/// One candidate result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choice
{   /// Chat completion
    Message
    {   message: ChatMessage
    }
  , /// Completion or edit
    Text
    {   text: String
    }
  , /// Generated or edited image
    Image
    {   url: String
    }
}

impl Choice
{   pub fn text(&self) -> Option<&str>
    {   match self
        {   Choice::Text { text } => Some(text)
          , Choice::Message { message } => Some(&message.content)
          , Choice::Image { .. } => None
        }
    }

    pub fn message(&self) -> Option<&ChatMessage>
    {   match self
        {   Choice::Message { message } => Some(message)
          , _ => None
        }
    }

    pub fn url(&self) -> Option<&str>
    {   match self
        {   Choice::Image { url } => Some(url)
          , _ => None
        }
    }
}

/// Parsed top-level response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope
{   Success(Vec<Choice>)
  , Error(ApiErrorBody)
}

impl Envelope
{   /// Classify a raw body. Any `error` key wins; otherwise `choices`
    /// (text/chat) or `data` (images) must be an array.
    pub fn from_value(body: Value) -> Result<Envelope, Error>
    {   let mut obj = match body
        {   Value::Object(obj) => obj
          , other => {
              error!("Response is not a JSON object: {}", other);
              return Err(Error::ParseError(
                format!("expected object, got {}", other)
              ));
            }
        };

        if let Some(err) = obj.remove("error")
        {   let body = ApiErrorBody::from_value(err);
            trace!("Error envelope: {}", body.message);
            return Ok(Envelope::Error(body));
        }

        let list = obj.remove("choices")
          .or_else(|| obj.remove("data"))
          .ok_or_else(|| {
            error!("Response has neither choices nor error");
            Error::ParseError(
              "response has neither choices nor error".to_string()
            )
          })?;
        let choices: Vec<Choice> = serde_json::from_value(list)
          .map_err(|e| {
            error!("Unrecognised choice shape: {}", e);
            Error::ParseError(e.to_string())
          })?;
        Ok(Envelope::Success(choices))
    }

    pub fn parse(body: &str) -> Result<Envelope, Error>
    {   let value: Value = serde_json::from_str(body)
          .map_err(|e| Error::ParseError(e.to_string()))?;
        Envelope::from_value(value)
    }

    pub fn is_error(&self) -> bool
    {   matches!(self, Envelope::Error(_))
    }

    pub fn choices(&self) -> Option<&[Choice]>
    {   match self
        {   Envelope::Success(choices) => Some(choices)
          , Envelope::Error(_) => None
        }
    }

    /// Success choices, or the remote error as `ApiError`
    pub fn into_choices(self) -> Result<Vec<Choice>, Error>
    {   match self
        {   Envelope::Success(choices) => Ok(choices)
          , Envelope::Error(body) => Err(Error::ApiError(body.message))
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn completion_choices()
    {   let env = Envelope::from_value(json!({
          "id": "cmpl-1",
          "choices": [{"text": " hi ", "index": 0, "finish_reason": "stop"}]
        })).unwrap();
        assert_eq!(
          env,
          Envelope::Success(vec![Choice::Text { text: " hi ".into() }])
        );
    }

    #[test]
    fn chat_choices_are_messages()
    {   let env = Envelope::from_value(json!({
          "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello!"},
            "finish_reason": "stop"
          }]
        })).unwrap();
        let choices = env.into_choices().unwrap();
        assert_eq!(
          choices[0].message(),
          Some(&ChatMessage::assistant("Hello!"))
        );
        assert_eq!(choices[0].text(), Some("Hello!"));
    }

    #[test]
    fn image_data_becomes_choices()
    {   let env = Envelope::from_value(json!({
          "created": 1589478378,
          "data": [{"url": "https://img/1.png"}, {"url": "https://img/2.png"}]
        })).unwrap();
        let urls: Vec<_> = env.choices().unwrap()
          .iter()
          .filter_map(|c| c.url())
          .collect();
        assert_eq!(urls, vec!["https://img/1.png", "https://img/2.png"]);
    }

    #[test]
    fn error_key_wins()
    {   let env = Envelope::from_value(json!({
          "choices": [],
          "error": {"message": "That model is currently overloaded", "type": "server_error"}
        })).unwrap();
        assert!(env.is_error());
        assert_eq!(
          env.into_choices(),
          Err(Error::ApiError("That model is currently overloaded".into()))
        );
    }

    #[test]
    fn any_error_value_is_an_error_envelope()
    {   let env = Envelope::from_value(json!({
          "error": {"code": 503, "type": "server_error"}
        })).unwrap();
        match env
        {   Envelope::Error(body) => {
              assert_eq!(body.kind.as_deref(), Some("server_error"));
              assert_eq!(body.code, Some(json!(503)));
              assert!(body.message.contains("503"));
            }
          , other => panic!("expected error envelope, got {:?}", other)
        }

        let env = Envelope::from_value(json!({"error": null})).unwrap();
        assert_eq!(
          env,
          Envelope::Error(ApiErrorBody
          {   message: "null".to_string()
            , kind: None
            , code: None
          })
        );

        let env = Envelope::from_value(json!({
          "error": {"message": null, "code": null}
        })).unwrap();
        match env
        {   Envelope::Error(body) => assert_eq!(body.code, None)
          , other => panic!("expected error envelope, got {:?}", other)
        }

        assert!(Envelope::from_value(json!({"error": "rate limited"}))
          .unwrap()
          .is_error());
    }

    #[test]
    fn neither_shape_is_a_parse_error()
    {   assert!(matches!(
          Envelope::from_value(json!({"object": "list"})),
          Err(Error::ParseError(_))
        ));
        assert!(matches!(
          Envelope::parse("<html>502</html>"),
          Err(Error::ParseError(_))
        ));
    }
}
