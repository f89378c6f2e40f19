//! The upstream call primitive.
//!
//! Everything above this layer only sees a status code and a JSON body
//! (or a structured error), so tests can swap in a scripted transport.

use std::time::Duration;
use async_trait::async_trait;
use log::{debug, error, trace};

use crate::providers::gemini::{error_message, redact};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method
{   Get
  , Post
}

/// One outbound call
#[derive(Debug, Clone)]
pub struct TransportRequest
{   pub method: Method
  , pub url: String
  , pub body: Option<serde_json::Value>
  , pub timeout: Duration
}

impl TransportRequest
{   pub fn get(url: impl Into<String>, timeout: Duration) -> Self
    {   TransportRequest
        {   method: Method::Get
          , url: url.into()
          , body: None
          , timeout
        }
    }

    pub fn post(
      url: impl Into<String>
    , body: serde_json::Value
    , timeout: Duration
    ) -> Self
    {   TransportRequest
        {   method: Method::Post
          , url: url.into()
          , body: Some(body)
          , timeout
        }
    }
}

/// A 2xx answer with its JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse
{   pub status: u16
  , pub body: serde_json::Value
}

/// Non-2xx answer, or no answer at all.
/// `status` is `None` for network failures and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError
{   pub status: Option<u16>
  , pub message: String
  , pub body: Option<serde_json::Value>
}

impl TransportError
{   /// Upstream answered with an error status
    pub fn status(status: u16, body: serde_json::Value) -> Self
    {   let message = error_message(&body)
          .unwrap_or_else(|| format!("Upstream returned status {}", status));
        TransportError
        {   status: Some(status)
          , message
          , body: Some(body)
        }
    }

    /// Connection failure, reset, unreadable body
    pub fn network(message: impl Into<String>) -> Self
    {   TransportError
        {   status: None
          , message: message.into()
          , body: None
        }
    }

    pub fn timeout(after: Duration) -> Self
    {   TransportError
        {   status: None
          , message: format!("Upstream did not answer within {:?}", after)
          , body: None
        }
    }
}

pub type TransportResult = Result<TransportResponse, TransportError>;

/// `Call(url, body, timeout) -> (status, body | error)`
#[async_trait]
pub trait Transport: Send + Sync
{   async fn call(&self, request: TransportRequest) -> TransportResult;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport
{   http_client: reqwest::Client
}

impl HttpTransport
{   pub fn new() -> Self
    {   debug!("Creating HttpTransport");
        HttpTransport
        {   http_client: reqwest::Client::new()
        }
    }
}

impl Default for HttpTransport
{   fn default() -> Self
    {   HttpTransport::new()
    }
}

// reqwest errors print the URL, and the URL carries the key.
fn describe(e: reqwest::Error) -> String
{   e.without_url().to_string()
}

#[async_trait]
impl Transport for HttpTransport
{   async fn call(&self, request: TransportRequest) -> TransportResult
    {   let TransportRequest { method, url, body, timeout } = request;
        trace!("{:?} {}", method, redact(&url));

        let mut builder = match method
        {   Method::Get => self.http_client.get(&url)
          , Method::Post => self.http_client.post(&url)
        };
        builder = builder.timeout(timeout);
        if let Some(body) = &body
        {   builder = builder
              .header("Content-Type", "application/json")
              .json(body);
        }

        let response = builder.send().await.map_err(|e| {
          if e.is_timeout()
          {   error!("Upstream timeout: {}", redact(&url));
              TransportError::timeout(timeout)
          } else
          {   let message = describe(e);
              error!("HTTP error: {}", message);
              TransportError::network(message)
          }
        })?;

        let status = response.status().as_u16();
        trace!("Upstream response status: {}", status);

        let text = response.text().await.map_err(|e| {
          let message = describe(e);
          error!("Failed to read upstream body: {}", message);
          TransportError::network(message)
        })?;
        let parsed = if text.trim().is_empty()
        {   Ok(serde_json::Value::Null)
        } else
        {   serde_json::from_str::<serde_json::Value>(&text)
        };

        if (200..300).contains(&status)
        {   match parsed
            {   Ok(body) => Ok(TransportResponse { status, body })
              , Err(e) => {
                  error!("Upstream status {} with a non-JSON body: {}", status, e);
                  Err(TransportError::network(format!(
                    "Upstream returned an unreadable body (status {})",
                    status
                  )))
                }
            }
        } else
        {   // Non-JSON error pages keep their text as the message
            let body = parsed.unwrap_or_else(|_| {
              serde_json::json!({ "error": { "message": text } })
            });
            Err(TransportError::status(status, body))
        }
    }
}
