//! Prompt log and the client wrapper that feeds it
//!
//! Two append-only stores: an index of prompts seen (with tags) for
//! skip decisions, and a log of prompt/result pairs partitioned by the
//! local calendar day of the write.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use log::{debug, info};
use crate::client::{Client, Generate};
use crate::config::LogConfig;
use crate::error::Error;
use crate::failover::Sleeper;
use crate::providers::openai::Transport;
use crate::request::RequestOptions;
use crate::store::{JsonlStore, Order, RecordStore};
use crate::TaskKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry
{   pub prompt: String
  , #[serde(default)]
    pub tags: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry
{   pub prompt: String
  , pub result: String
  , pub timestamp: DateTime<Local>
}

pub struct PromptLog
{   config: LogConfig
  , index: JsonlStore<IndexEntry>
  , entries: Vec<IndexEntry>
}

impl PromptLog
{   /// Loads the index snapshot once; later membership checks scan it
    pub fn open(config: LogConfig) -> Result<Self, Error>
    {   let index: JsonlStore<IndexEntry>
          = JsonlStore::new(config.index_path(), config.order);
        let entries = index.snapshot()?;
        info!(
          "Prompt log at {} holds {} prompts",
          config.filepath.display(), entries.len()
        );
        Ok(PromptLog
        {   config
          , index
          , entries
        })
    }

    /// Exact match on the stored prompt text
    pub fn already_logged(&self, prompt: &str) -> bool
    {   self.entries.iter().any(|e| e.prompt == prompt)
    }

    /// Newest index entry for `prompt`
    pub fn lookup(&self, prompt: &str) -> Option<&IndexEntry>
    {   match self.config.order
        {   Order::Descending => self.entries.iter().find(|e| e.prompt == prompt)
          , Order::Ascending => self.entries.iter().rev().find(|e| e.prompt == prompt)
        }
    }

    /// Index snapshot in the configured order
    pub fn entries(&self) -> &[IndexEntry]
    {   &self.entries
    }

    pub fn record(
      &mut self
    , prompt: &str
    , result: &str
    , tags: Option<&str>
    ) -> Result<(), Error>
    {   self.record_at(prompt, result, tags, Local::now())
    }

    /// Append to both stores; never rewrites earlier entries.
    /// Day log first, index second, snapshot last: a failed write
    /// leaves the prompt unmarked.
    pub fn record_at(
      &mut self
    , prompt: &str
    , result: &str
    , tags: Option<&str>
    , timestamp: DateTime<Local>
    ) -> Result<(), Error>
    {   let mut day_log = self.day_store(timestamp.date_naive());
        day_log.append(&LogEntry
        {   prompt: prompt.to_string()
          , result: result.to_string()
          , timestamp
        })?;

        let entry = IndexEntry
        {   prompt: prompt.to_string()
          , tags: tags.map(str::to_string)
        };
        self.index.append(&entry)?;
        match self.config.order
        {   Order::Descending => self.entries.insert(0, entry)
          , Order::Ascending => self.entries.push(entry)
        }
        debug!(
          "Recorded prompt ({} chars) in {}",
          prompt.len(), day_log.path().display()
        );
        Ok(())
    }

    /// Everything written on `day`, oldest first
    pub fn day_entries(&self, day: NaiveDate) -> Result<Vec<LogEntry>, Error>
    {   let store: JsonlStore<LogEntry>
          = JsonlStore::new(self.config.log_path(day), Order::Ascending);
        store.snapshot()
    }

    fn day_store(&self, day: NaiveDate) -> JsonlStore<LogEntry>
    {   JsonlStore::new(self.config.log_path(day), self.config.order)
    }
}

/// Client wrapper that records every successful answer
pub struct RecordingClient<T, S>
{   client: Client<T, S>
  , log: PromptLog
}

impl<T, S> RecordingClient<T, S>
where
  T: Transport
, S: Sleeper
{   pub fn new(client: Client<T, S>, log: PromptLog) -> Self
    {   RecordingClient
        {   client
          , log
        }
    }

    pub fn already_logged(&self, prompt: &str) -> bool
    {   self.log.already_logged(prompt)
    }

    pub fn log(&self) -> &PromptLog
    {   &self.log
    }

    pub fn client(&self) -> &Client<T, S>
    {   &self.client
    }

    pub fn into_parts(self) -> (Client<T, S>, PromptLog)
    {   (self.client, self.log)
    }

    pub async fn completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   let reply = self.client.completion(prompt).await?;
        self.keep(prompt, &reply, TaskKind::Text)
    }

    pub async fn code_completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   let reply = self.client.code_completion(prompt).await?;
        self.keep(prompt, &reply, TaskKind::Code)
    }

    pub async fn chat(&mut self, text: &str)
      -> Result<String, Error>
    {   let reply = self.client.chat(text).await?;
        self.keep(text, &reply, TaskKind::Chat)
    }

    pub async fn edit(&mut self, input: &str, instruction: &str)
      -> Result<String, Error>
    {   let reply = self.client.edit(input, instruction).await?;
        self.keep(input, &reply, TaskKind::Edit)
    }

    /// Image URLs are logged newline-joined
    pub async fn image_generation(
      &mut self
    , prompt: &str
    , options: &RequestOptions
    ) -> Result<Vec<String>, Error>
    {   let urls = self.client.image_generation(prompt, options).await?;
        self.keep(prompt, &urls.join("\n"), TaskKind::ImageGen)?;
        Ok(urls)
    }

    pub async fn image_edit(
      &mut self
    , prompt: &str
    , image: &str
    , mask: Option<&str>
    ) -> Result<Vec<String>, Error>
    {   let urls = self.client.image_edit(prompt, image, mask).await?;
        self.keep(prompt, &urls.join("\n"), TaskKind::ImageEdit)?;
        Ok(urls)
    }

    fn keep(&mut self, prompt: &str, reply: &str, kind: TaskKind)
      -> Result<String, Error>
    {   self.log.record(prompt, reply, Some(kind.label()))?;
        Ok(reply.to_string())
    }
}

impl<T, S> Generate for RecordingClient<T, S>
where
  T: Transport
, S: Sleeper
{   async fn completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   RecordingClient::completion(self, prompt).await
    }

    async fn code_completion(&mut self, prompt: &str)
      -> Result<String, Error>
    {   RecordingClient::code_completion(self, prompt).await
    }

    async fn chat(&mut self, text: &str)
      -> Result<String, Error>
    {   RecordingClient::chat(self, text).await
    }
}
