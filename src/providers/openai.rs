use serde_json::Value;
use log::{debug, trace, error};
use std::path::Path;
use std::time::Duration;
use crate::config::ClientConfig;
use crate::error::Error;

pub const COMPLETIONS: &str = "completions";
pub const EDITS: &str = "edits";
pub const IMAGE_GENERATIONS: &str = "images/generations";
pub const IMAGE_EDITS: &str = "images/edits";
pub const CHAT_COMPLETIONS: &str = "chat/completions";

/// Moves one JSON body to an endpoint and hands back the parsed
/// response body. Classification happens in the client.
#[allow(async_fn_in_trait)]
pub trait Transport
{   async fn post(
      &self
    , endpoint: &str
    , body: &Value
    ) -> Result<Value, Error>;
}

/// HTTPS transport for the OpenAI REST API
#[derive(Debug, Clone)]
pub struct OpenAiTransport
{   api_key: String
  , api_base: String
  , debug: bool
  , http_client: reqwest::Client
}

impl OpenAiTransport
{   /// Fails with `MissingApiKey` before any request can be made
    pub fn new(config: &ClientConfig) -> Result<Self, Error>
    {   config.validate()?;
        let api_key = config.apikey.clone()
          .ok_or_else(|| Error::MissingApiKey("apikey".to_string()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs
        {   builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            Error::InvalidConfiguration(e.to_string())
          })?;

        debug!("Creating OpenAiTransport for {}", config.api_base);
        Ok(OpenAiTransport
        {   api_key
          , api_base: config.api_base.trim_end_matches('/').to_string()
          , debug: config.debug
          , http_client
        })
    }

    pub fn url(&self, endpoint: &str) -> String
    {   format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'))
    }
}

impl Transport for OpenAiTransport
{   async fn post(
      &self
    , endpoint: &str
    , body: &Value
    ) -> Result<Value, Error>
    {   let url = self.url(endpoint);
        if self.debug
        {   debug!("POST {} body: {}", url, body);
        }

        let response = self.http_client
          .post(&url)
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(body)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Response status: {}", status);

        let text = response.text().await
          .map_err(|e| {
            error!("Failed to read body: {}", e);
            Error::HttpError(e.to_string())
          })?;
        if self.debug
        {   debug!("Response body ({}): {}", status, text);
        }

        // error envelopes arrive with non-2xx statuses, so parse first
        serde_json::from_str(&text).map_err(|e| {
          error!("Non-JSON body with status {}: {}", status, e);
          Error::ParseError(format!("status {}: {}", status, e))
        })
    }
}

/// Fetch `url` and write the bytes to `dest`. No retries.
pub async fn download_image(
  url: &str
, dest: impl AsRef<Path>
) -> Result<u64, Error>
{   let dest = dest.as_ref();
    debug!("Downloading {} to {}", url, dest.display());

    let response = reqwest::get(url).await
      .map_err(|e| Error::DownloadError(e.to_string()))?;
    let status = response.status();
    if !status.is_success()
    {   error!("Download of {} failed with {}", url, status);
        return Err(Error::DownloadError(
          format!("{} returned {}", url, status)
        ));
    }
    let bytes = response.bytes().await
      .map_err(|e| Error::DownloadError(e.to_string()))?;
    tokio::fs::write(dest, &bytes).await
      .map_err(|e| {
        Error::DownloadError(format!("{}: {}", dest.display(), e))
      })?;
    Ok(bytes.len() as u64)
}
