use std::fmt;

/// Custom error type for gptrec operations
/// Implements Clone so results can be compared and replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// No API key was configured
    MissingApiKey(String)
  , /// HTTP request error (connect, timeout, body read)
    HttpError(String)
  , /// Remote endpoint answered with an error envelope
    ApiError(String)
  , /// Response body was not a recognisable envelope
    ParseError(String)
  , /// Success envelope carried no choices
    NoChoicesInResponse
  , /// Choice shape did not match the task kind
    UnexpectedChoice(String)
  , /// Image download failed
    DownloadError(String)
  , /// Record store could not be read or written
    StoreError(String)
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Generic error
    Other(String)
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey(what) => {
              write!(f, "Missing API key: {}", what)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ApiError(msg) => {
              write!(f, "API error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::NoChoicesInResponse => {
              write!(f, "API response contained no choices")
            }
          , Error::UnexpectedChoice(msg) => {
              write!(f, "Unexpected choice shape: {}", msg)
            }
          , Error::DownloadError(msg) => {
              write!(f, "Download failed: {}", msg)
            }
          , Error::StoreError(msg) => {
              write!(f, "Record store error: {}", msg)
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
