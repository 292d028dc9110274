//! Replay a queue of prompts through the recording client

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::{debug, info, warn, error};
use crate::config::BatchConfig;
use crate::error::Error;
use crate::failover::{RetryPolicy, Sleeper, TokioSleeper};
use crate::providers::openai::Transport;
use crate::recorder::RecordingClient;
use crate::store::{JsonlStore, Order, RecordStore};
use crate::{PromptRecord, TaskKind};

/// Raw queue line: `{"prompt": "...", "type": "code", "redo": "true"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRow
{   pub prompt: String
  , #[serde(rename = "type", default)]
    pub kind: String
  , #[serde(default)]
    pub redo: String
}

impl From<QueueRow> for PromptRecord
{   fn from(row: QueueRow) -> Self
    {   PromptRecord
        {   task_kind: TaskKind::from_queue_type(&row.kind)
          , redo: row.redo == "true"
          , prompt: row.prompt
        }
    }
}

/// Read a JSON-lines queue, first line first
pub fn load_queue(path: impl AsRef<Path>)
  -> Result<Vec<PromptRecord>, Error>
{   let store: JsonlStore<QueueRow>
      = JsonlStore::new(path.as_ref(), Order::Ascending);
    let rows = store.snapshot()?;
    debug!("Loaded {} queued prompts", rows.len());
    Ok(rows.into_iter().map(PromptRecord::from).collect())
}

/// Sequential runner: one reply slot per record, never aborts
pub struct BatchRunner<'a, T, S, B = TokioSleeper>
{   recorder: &'a mut RecordingClient<T, S>
  , sleeper: B
  , policy: RetryPolicy
  , cooldown: Duration
}

impl<'a, T, S> BatchRunner<'a, T, S, TokioSleeper>
where
  T: Transport
, S: Sleeper
{   pub fn new(
      recorder: &'a mut RecordingClient<T, S>
    , config: &BatchConfig
    ) -> Self
    {   BatchRunner::with_sleeper(recorder, config, TokioSleeper)
    }
}

impl<'a, T, S, B> BatchRunner<'a, T, S, B>
where
  T: Transport
, S: Sleeper
, B: Sleeper
{   pub fn with_sleeper(
      recorder: &'a mut RecordingClient<T, S>
    , config: &BatchConfig
    , sleeper: B
    ) -> Self
    {   BatchRunner
        {   recorder
          , sleeper
          , policy: RetryPolicy::new(config.attempts, config.retry_delay_ms)
          , cooldown: Duration::from_millis(config.cooldown_ms)
        }
    }

    /// Replies in input order. Skipped and abandoned records yield "".
    pub async fn run(&mut self, records: &[PromptRecord]) -> Vec<String>
    {   info!("Batch of {} prompts", records.len());
        let mut replies = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate()
        {   let reply = self.run_one(i, record).await;
            replies.push(reply);
        }
        replies
    }

    async fn run_one(&mut self, i: usize, record: &PromptRecord) -> String
    {   if !record.redo && self.recorder.already_logged(&record.prompt)
        {   info!("#{} already logged, skipping", i);
            return String::new();
        }

        let mut attempt = 0;
        let reply = loop
        {   attempt += 1;
            match self.dispatch(record).await
            {   Ok(reply) => break reply
              , Err(e) => {
                  warn!(
                    "#{} attempt {}/{} failed: {}",
                    i, attempt, self.policy.max_attempts, e
                  );
                  if !self.policy.should_retry(attempt)
                  {   error!("#{} abandoned after {} attempts", i, attempt);
                      break String::new();
                  }
                  self.sleeper.sleep(self.policy.delay).await;
                }
            }
        };

        self.sleeper.sleep(self.cooldown).await;
        reply
    }

    async fn dispatch(&mut self, record: &PromptRecord)
      -> Result<String, Error>
    {   match record.task_kind
        {   TaskKind::Code => self.recorder.code_completion(&record.prompt).await
          , TaskKind::Chat => self.recorder.chat(&record.prompt).await
          , _ => self.recorder.completion(&record.prompt).await
        }
    }
}
