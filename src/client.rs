use log::{debug, trace, warn, error};
use crate::config::ClientConfig;
use crate::conversation::ConversationState;
use crate::envelope::{Choice, Envelope};
use crate::error::Error;
use crate::failover::{RetryPolicy, Sleeper, TokioSleeper};
use crate::providers::openai::{OpenAiTransport, Transport};
use crate::request::{self, RequestOptions, RequestPayload};
use crate::TaskKind;

/// What a batch or a wrapper needs from anything that generates text
#[allow(async_fn_in_trait)]
pub trait Generate
{   async fn completion(&mut self, prompt: &str)
      -> Result<String, Error>;
    async fn code_completion(&mut self, prompt: &str)
      -> Result<String, Error>;
    async fn chat(&mut self, text: &str)
      -> Result<String, Error>;
}

/// Transport client with bounded retry and depth-one chat memory
pub struct Client<T, S = TokioSleeper>
{   transport: T
  , sleeper: S
  , policy: RetryPolicy
  , strict: bool
  , debug: bool
  , conversation: ConversationState
}

impl Client<OpenAiTransport, TokioSleeper>
{   /// Client over HTTPS with real delays
    pub fn new(config: &ClientConfig) -> Result<Self, Error>
    {   let transport = OpenAiTransport::new(config)?;
        Client::with_transport(config, transport, TokioSleeper)
    }
}

impl<T, S> Client<T, S>
where
  T: Transport
, S: Sleeper
{   /// Still checks the key, whatever the transport
    pub fn with_transport(
      config: &ClientConfig
    , transport: T
    , sleeper: S
    ) -> Result<Self, Error>
    {   config.validate()?;
        debug!(
          "Creating Client (attempts: {}, strict: {})",
          config.attempts, config.strict
        );
        Ok(Client
        {   transport
          , sleeper
          , policy: RetryPolicy::new(
              config.attempts,
              config.retry_delay_ms
            )
          , strict: config.strict
          , debug: config.debug
          , conversation: ConversationState::new()
        })
    }

    /// Replace the remembered chat turn
    pub fn with_conversation(mut self, state: ConversationState) -> Self
    {   self.conversation = state;
        self
    }

    pub fn conversation(&self) -> &ConversationState
    {   &self.conversation
    }

    pub fn into_conversation(self) -> ConversationState
    {   self.conversation
    }

    pub fn policy(&self) -> &RetryPolicy
    {   &self.policy
    }

    pub fn transport(&self) -> &T
    {   &self.transport
    }

    /// Send with the configured attempt bound
    pub async fn send(
      &self
    , endpoint: &str
    , payload: &RequestPayload
    ) -> Result<Envelope, Error>
    {   self.send_with_attempts(endpoint, payload, self.policy.max_attempts)
          .await
    }

    /// At most `max_attempts` calls. Error envelopes are retried after
    /// the fixed delay; transport and parse failures return at once.
    /// Once attempts run out the last error envelope is returned, or
    /// raised as `ApiError` in strict mode.
    pub async fn send_with_attempts(
      &self
    , endpoint: &str
    , payload: &RequestPayload
    , max_attempts: usize
    ) -> Result<Envelope, Error>
    {   let max_attempts = max_attempts.max(1);
        let body = payload.to_json();
        if self.debug
        {   debug!("Sending to {}: {}", endpoint, body);
        }

        let mut attempt = 0;
        loop
        {   attempt += 1;
            let raw = self.transport.post(endpoint, &body).await?;
            let envelope = Envelope::from_value(raw)?;

            let message = match &envelope
            {   Envelope::Success(choices) => {
                  trace!(
                    "{} answered with {} choices on attempt {}",
                    endpoint, choices.len(), attempt
                  );
                  return Ok(envelope);
                }
              , Envelope::Error(err) => err.message.clone()
            };

            warn!(
              "{} attempt {}/{} failed; prompt: {:?}; result: {}",
              endpoint,
              attempt,
              max_attempts,
              payload.primary_input().unwrap_or_default(),
              message
            );

            if attempt >= max_attempts
            {   if self.strict
                {   error!("Giving up on {} after {} attempts", endpoint, attempt);
                    return Err(Error::ApiError(message));
                }
                return Ok(envelope);
            }
            self.sleeper.sleep(self.policy.delay).await;
        }
    }

    /// Build and send one request of `kind`. Chat requests carry the
    /// remembered turn, and a successful chat reply replaces it.
    pub async fn submit(
      &mut self
    , prompt: &str
    , kind: TaskKind
    , options: &RequestOptions
    ) -> Result<Envelope, Error>
    {   let remembered = match kind
        {   TaskKind::Chat => self.conversation.consume()
          , _ => None
        };
        let payload = request::build_with_memory(
          kind, prompt, options, remembered
        );
        let envelope = self.send(kind.endpoint(), &payload).await?;

        if kind == TaskKind::Chat
        {   if let Some(first) = envelope.choices().and_then(|c| c.first())
            {   self.conversation.update_after_chat(first);
            }
        }
        Ok(envelope)
    }

    /// Every choice text for a plain completion
    pub async fn completions(&mut self, prompt: &str)
      -> Result<Vec<String>, Error>
    {   let choices = self
          .submit(prompt, TaskKind::Text, &RequestOptions::default())
          .await?
          .into_choices()?;
        texts(&choices)
    }

    /// First completion, trimmed
    pub async fn completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   self.first_text(prompt, TaskKind::Text, &RequestOptions::default())
          .await
    }

    pub async fn complete(&mut self, prompt: &str)
      -> Result<String, Error>
    {   self.completion(prompt).await
    }

    pub async fn code_completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   self.first_text(prompt, TaskKind::Code, &RequestOptions::default())
          .await
    }

    /// Rewrite `input` following `instruction`
    pub async fn edit(&mut self, input: &str, instruction: &str)
      -> Result<String, Error>
    {   let options = RequestOptions::default().instruction(instruction);
        self.first_text(input, TaskKind::Edit, &options).await
    }

    /// One user turn; the reply becomes the remembered turn
    pub async fn chat(&mut self, text: &str)
      -> Result<String, Error>
    {   self.chat_with(text, &RequestOptions::default()).await
    }

    pub async fn chat_with(&mut self, text: &str, options: &RequestOptions)
      -> Result<String, Error>
    {   self.first_text(text, TaskKind::Chat, options).await
    }

    /// URLs of the generated images
    pub async fn image_generation(
      &mut self
    , prompt: &str
    , options: &RequestOptions
    ) -> Result<Vec<String>, Error>
    {   let choices = self
          .submit(prompt, TaskKind::ImageGen, options)
          .await?
          .into_choices()?;
        urls(&choices)
    }

    pub async fn image_edit(
      &mut self
    , prompt: &str
    , image: &str
    , mask: Option<&str>
    ) -> Result<Vec<String>, Error>
    {   let mut options = RequestOptions::default().image(image);
        options.mask = mask.map(str::to_string);
        let choices = self
          .submit(prompt, TaskKind::ImageEdit, &options)
          .await?
          .into_choices()?;
        urls(&choices)
    }

    async fn first_text(
      &mut self
    , prompt: &str
    , kind: TaskKind
    , options: &RequestOptions
    ) -> Result<String, Error>
    {   let choices = self.submit(prompt, kind, options).await?
          .into_choices()?;
        let first = choices.first()
          .ok_or_else(|| {
            error!("No choices in {:?} response", kind);
            Error::NoChoicesInResponse
          })?;
        first.text()
          .map(|t| t.trim().to_string())
          .ok_or_else(|| Error::UnexpectedChoice(format!("{:?}", first)))
    }
}

impl<T, S> Generate for Client<T, S>
where
  T: Transport
, S: Sleeper
{   async fn completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   Client::completion(self, prompt).await
    }

    async fn code_completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   Client::code_completion(self, prompt).await
    }

    async fn chat(&mut self, text: &str)
      -> Result<String, Error>
    {   Client::chat(self, text).await
    }
}

fn texts(choices: &[Choice]) -> Result<Vec<String>, Error>
{   choices.iter()
      .map(|c| {
        c.text()
          .map(str::to_string)
          .ok_or_else(|| Error::UnexpectedChoice(format!("{:?}", c)))
      })
      .collect()
}

fn urls(choices: &[Choice]) -> Result<Vec<String>, Error>
{   choices.iter()
      .map(|c| {
        c.url()
          .map(str::to_string)
          .ok_or_else(|| Error::UnexpectedChoice(format!("{:?}", c)))
      })
      .collect()
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::time::Duration;
    use serde_json::json;
    use crate::failover::RecordingSleeper;
    use crate::providers::mock::ScriptedTransport;
    use crate::request::ChatMessage;

    fn client(
      attempts: usize
    , strict: bool
    ) -> (Client<ScriptedTransport, RecordingSleeper>, ScriptedTransport, RecordingSleeper)
    {   let mut config = ClientConfig::with_key("sk-test");
        config.attempts = attempts;
        config.strict = strict;
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let client = Client::with_transport(
          &config, transport.clone(), sleeper.clone()
        ).unwrap();
        (client, transport, sleeper)
    }

    #[test]
    fn construction_needs_a_key()
    {   let result = Client::with_transport(
          &ClientConfig::default(),
          ScriptedTransport::new(),
          RecordingSleeper::new()
        );
        assert!(matches!(result, Err(Error::MissingApiKey(_))));
    }

    #[tokio::test]
    async fn completion_is_trimmed()
    {   let (mut client, transport, _) = client(1, false);
        transport.reply_text(" This is indeed a test ");
        let reply = client.completion("Say this is a test").await.unwrap();
        assert_eq!(reply, "This is indeed a test");

        let (endpoint, body) = &transport.requests()[0];
        assert_eq!(endpoint, "completions");
        assert_eq!(body["prompt"], json!("Say this is a test"));
        assert_eq!(body["model"], json!("text-davinci-003"));
    }

    #[tokio::test]
    async fn retries_until_success()
    {   let (client, transport, sleeper) = client(3, false);
        transport
          .reply_error("overloaded")
          .reply_error("overloaded")
          .reply_text("ok");
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        let envelope = client.send("completions", &payload).await.unwrap();
        assert_eq!(
          envelope,
          Envelope::Success(vec![Choice::Text { text: "ok".into() }])
        );
        assert_eq!(transport.calls(), 3);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn error_without_message_is_still_retried()
    {   let (client, transport, sleeper) = client(3, false);
        transport
          .reply(json!({"error": {"code": 503, "type": "server_error"}}))
          .reply_text("ok");
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        let envelope = client.send("completions", &payload).await.unwrap();
        assert_eq!(
          envelope,
          Envelope::Success(vec![Choice::Text { text: "ok".into() }])
        );
        assert_eq!(transport.calls(), 2);
        assert_eq!(sleeper.slept().len(), 1);
    }

    #[tokio::test]
    async fn strict_mode_covers_bare_error_bodies()
    {   let (client, transport, _) = client(1, true);
        transport.reply(json!({"error": null}));
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );
        assert_eq!(
          client.send("completions", &payload).await,
          Err(Error::ApiError("null".to_string()))
        );
    }

    #[tokio::test]
    async fn debug_flag_does_not_change_outcome()
    {   let mut outcomes = Vec::new();
        for debug in [false, true]
        {   let mut config = ClientConfig::with_key("sk-test");
            config.attempts = 3;
            config.debug = debug;
            let transport = ScriptedTransport::new();
            transport
              .reply_error("busy")
              .reply_error("busy")
              .reply_text(" done ");
            let mut client = Client::with_transport(
              &config, transport.clone(), RecordingSleeper::new()
            ).unwrap();
            let reply = client.completion("same prompt").await;
            outcomes.push((reply, transport.calls()));
        }
        assert_eq!(outcomes[0], (Ok("done".to_string()), 3));
        assert_eq!(outcomes[0], outcomes[1]);
    }

    #[tokio::test]
    async fn default_is_a_single_attempt()
    {   let (client, transport, sleeper) = client(1, false);
        transport.reply_error("busy").reply_text("never reached");
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        let envelope = client.send("completions", &payload).await.unwrap();
        assert!(envelope.is_error());
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn exhausted_error_is_returned_as_data()
    {   let (client, transport, _) = client(2, false);
        transport.reply_error("first").reply_error("second");
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        let envelope = client.send("completions", &payload).await.unwrap();
        match envelope
        {   Envelope::Error(body) => assert_eq!(body.message, "second")
          , other => panic!("expected error envelope, got {:?}", other)
        }
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn strict_mode_raises()
    {   let (client, transport, _) = client(2, true);
        transport.reply_error("nope").reply_error("still nope");
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        assert_eq!(
          client.send("completions", &payload).await,
          Err(Error::ApiError("still nope".to_string()))
        );
    }

    #[tokio::test]
    async fn transport_failures_are_not_retried()
    {   let (client, transport, sleeper) = client(3, false);
        transport.fail(Error::HttpError("connection reset".into()));
        let payload = request::build(
          TaskKind::Text, "x", &RequestOptions::default()
        );

        assert_eq!(
          client.send("completions", &payload).await,
          Err(Error::HttpError("connection reset".into()))
        );
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn chat_threads_exactly_one_turn()
    {   let (mut client, transport, _) = client(1, false);
        transport
          .reply_chat("first reply")
          .reply_chat("second reply")
          .reply_chat("third reply");

        assert_eq!(client.chat("one").await.unwrap(), "first reply");
        assert_eq!(client.chat("two").await.unwrap(), "second reply");
        assert_eq!(client.chat("three").await.unwrap(), "third reply");

        let sent: Vec<Vec<ChatMessage>> = transport.requests()
          .into_iter()
          .map(|(endpoint, body)| {
            assert_eq!(endpoint, "chat/completions");
            serde_json::from_value(body["messages"].clone()).unwrap()
          })
          .collect();
        assert_eq!(sent[0], vec![ChatMessage::user("one")]);
        assert_eq!(
          sent[1],
          vec![ChatMessage::assistant("first reply"), ChatMessage::user("two")]
        );
        assert_eq!(
          sent[2],
          vec![ChatMessage::assistant("second reply"), ChatMessage::user("three")]
        );
    }

    #[tokio::test]
    async fn failed_chat_keeps_previous_memory()
    {   let (mut client, transport, _) = client(1, false);
        transport.reply_chat("remember me").reply_error("down");

        client.chat("hi").await.unwrap();
        assert!(client.chat("again").await.is_err());
        assert_eq!(
          client.conversation().consume(),
          Some(&ChatMessage::assistant("remember me"))
        );
    }

    #[tokio::test]
    async fn non_chat_calls_ignore_memory()
    {   let (client, transport, _) = client(1, false);
        let mut client = client.with_conversation(
          ConversationState::remembering(ChatMessage::assistant("old"))
        );
        transport.reply_text("done");
        client.completion("plain").await.unwrap();
        assert!(transport.requests()[0].1.get("messages").is_none());
    }

    #[tokio::test]
    async fn images_return_urls()
    {   let (mut client, transport, _) = client(1, false);
        transport.reply(json!({
          "created": 1,
          "data": [{"url": "https://img/a.png"}]
        }));
        let urls = client
          .image_generation("a cat", &RequestOptions::default().size("256x256"))
          .await
          .unwrap();
        assert_eq!(urls, vec!["https://img/a.png".to_string()]);
        let (endpoint, body) = &transport.requests()[0];
        assert_eq!(endpoint, "images/generations");
        assert_eq!(body["size"], json!("256x256"));
    }

    #[tokio::test]
    async fn edit_uses_edit_endpoint()
    {   let (mut client, transport, _) = client(1, false);
        transport.reply_text("What day of the week is it?\n");
        let out = client
          .edit("What day of the wek is it?", "Fix the spelling mistakes")
          .await
          .unwrap();
        assert_eq!(out, "What day of the week is it?");
        assert_eq!(transport.requests()[0].0, "edits");
    }

    #[tokio::test]
    async fn empty_choices_are_an_error()
    {   let (mut client, transport, _) = client(1, false);
        transport.reply(json!({"choices": []}));
        assert_eq!(
          client.completion("x").await,
          Err(Error::NoChoicesInResponse)
        );
    }
}
