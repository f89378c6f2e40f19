use std::fmt;

/// Custom error type for proxy operations
/// Implements Clone so a result can be handed across tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Caller sent something unusable (empty prompt, bad body)
    ClientInput(String)
  , /// No candidate model was reachable; names the last one tried
    UpstreamNotFound(String)
  , /// Credential rejected or quota exhausted
    UpstreamAuth
  , /// Any other upstream failure, with the upstream status kept
    UpstreamTransient
    {   status: u16
      , message: String
    }
  , /// Invalid configuration (no candidates, missing key, ...)
    InvalidConfiguration(String)
  , /// Failed to parse an upstream response
    ParseError(String)
  , /// Caller went away before a result was produced
    Cancelled
  , /// Generic error
    Other(String)
}

impl Error
{   /// HTTP status this error is reported with
    pub fn http_status(&self) -> u16
    {   match self
        {   Error::ClientInput(_) => 400
          , Error::UpstreamNotFound(_) => 404
          , Error::UpstreamAuth => 403
          , Error::UpstreamTransient { status, .. } => *status
          , Error::Cancelled => 499
          , Error::InvalidConfiguration(_)
          | Error::ParseError(_)
          | Error::Other(_) => 500
        }
    }

    /// Message that is safe to hand back to the caller
    pub fn public_message(&self) -> String
    {   match self
        {   Error::ClientInput(msg) => msg.clone()
          , Error::UpstreamNotFound(model) => {
              format!(
                "Model \"{}\" not found or not accessible. \
                 Check available models via /api/models.",
                model
              )
            }
          , Error::UpstreamAuth => {
              "API key invalid or quota exceeded.".to_string()
            }
          , Error::UpstreamTransient { message, .. } => message.clone()
          , Error::InvalidConfiguration(_) => {
              "Proxy is misconfigured: no upstream model available"
                .to_string()
            }
          , other => other.to_string()
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::ClientInput(msg) => {
              write!(f, "Invalid request: {}", msg)
            }
          , Error::UpstreamNotFound(model) => {
              write!(f, "Model not found upstream: {}", model)
            }
          , Error::UpstreamAuth => {
              write!(f, "Upstream rejected the API key")
            }
          , Error::UpstreamTransient { status, message } => {
              write!(f,
                "Upstream error ({}): {}",
                status, message
              )
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::Cancelled => {
              write!(f, "Request cancelled by caller")
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

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::ParseError(e.to_string())
    }
}
