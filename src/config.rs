//! Configuration for the client, the prompt log and the batch runner

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use log::{debug, error};
use crate::error::Error;
use crate::store::Order;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig
{   /// Bearer token for the remote endpoint (required)
    pub apikey: Option<String>
  , /// API base URL
    pub api_base: String
  , /// Dump payloads and raw bodies at debug level
    pub debug: bool
  , /// Max network calls per logical request (1 = no retry)
    pub attempts: usize
  , /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64
  , /// Raise `ApiError` instead of returning an error envelope
    pub strict: bool
  , /// Request timeout in seconds
    pub timeout_secs: Option<u64>
}

impl Default for ClientConfig
{   fn default() -> Self
    {   ClientConfig
        {   apikey: None
          , api_base: DEFAULT_API_BASE.to_string()
          , debug: false
          , attempts: 1
          , retry_delay_ms: 5_000
          , strict: false
          , timeout_secs: None
        }
    }
}

impl ClientConfig
{   /// Config with just a key, everything else defaulted
    pub fn with_key(apikey: impl Into<String>) -> Self
    {   ClientConfig
        {   apikey: Some(apikey.into())
          , ..ClientConfig::default()
        }
    }

    /// Read `OPENAI_API_KEY` and the optional `OPENAI_API_BASE`
    pub fn from_env() -> Result<Self, Error>
    {   let apikey = std::env::var("OPENAI_API_KEY")
          .map_err(|_| {
            error!("OPENAI_API_KEY not set");
            Error::MissingApiKey("OPENAI_API_KEY".to_string())
          })?;
        let mut config = ClientConfig::with_key(apikey);
        if let Ok(base) = std::env::var("OPENAI_API_BASE")
        {   config.api_base = base;
        }
        config.validate()?;
        Ok(config)
    }

    /// Fails fast when no usable key is present
    pub fn validate(&self) -> Result<(), Error>
    {   match &self.apikey
        {   Some(key) if !key.trim().is_empty() => {}
          , _ => {
              error!("Client configured without an API key");
              return Err(Error::MissingApiKey(
                "apikey".to_string()
              ));
            }
        }
        if self.attempts == 0
        {   return Err(Error::InvalidConfiguration(
              "attempts must be at least 1".to_string()
            ));
        }
        Ok(())
    }
}

/// Prompt log storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig
{   /// Directory holding both stores
    pub filepath: PathBuf
  , /// File name of the prompt index
    pub indexfile: String
  , /// Base name of the daily log; the day is appended
    pub logfile: String
  , /// Snapshot order used when loading the index
    pub order: Order
}

impl Default for LogConfig
{   fn default() -> Self
    {   LogConfig
        {   filepath: PathBuf::from(".")
          , indexfile: "gptrec_index.jsonl".to_string()
          , logfile: "gptrec_log".to_string()
          , order: Order::Descending
        }
    }
}

impl LogConfig
{   pub fn in_dir(dir: impl AsRef<Path>) -> Self
    {   LogConfig
        {   filepath: dir.as_ref().to_path_buf()
          , ..LogConfig::default()
        }
    }

    pub fn index_path(&self) -> PathBuf
    {   self.filepath.join(&self.indexfile)
    }

    /// Path of the log partition for `day` (YYYY-MM-DD)
    pub fn log_path(&self, day: chrono::NaiveDate) -> PathBuf
    {   self.filepath.join(format!(
          "{}_{}.jsonl",
          self.logfile,
          day.format("%Y-%m-%d")
        ))
    }
}

/// Batch runner pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig
{   /// Attempts per record before giving up with an empty reply
    pub attempts: usize
  , /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64
  , /// Delay after every dispatched record in milliseconds
    pub cooldown_ms: u64
}

impl Default for BatchConfig
{   fn default() -> Self
    {   BatchConfig
        {   attempts: 4
          , retry_delay_ms: 5_000
          , cooldown_ms: 2_000
        }
    }
}

/// Whole-process configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GptrecConfig
{   pub client: ClientConfig
  , pub log: LogConfig
  , pub batch: BatchConfig
}

impl GptrecConfig
{   /// Load from a JSON file; missing sections take their defaults
    pub fn from_json_file(path: impl AsRef<Path>)
      -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)
          .map_err(|e| {
            Error::InvalidConfiguration(
              format!("{}: {}", path.display(), e)
            )
          })?;
        let config: GptrecConfig = serde_json::from_str(&raw)
          .map_err(|e| {
            Error::InvalidConfiguration(
              format!("{}: {}", path.display(), e)
            )
          })?;
        config.client.validate()?;
        Ok(config)
    }
}
