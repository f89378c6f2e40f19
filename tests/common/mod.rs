#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use serde_json::json;

use glproxy::transport::TransportResult;
use glproxy::{ProxyConfig, Transport, TransportError, TransportRequest,
              TransportResponse};

pub const API_KEY: &str = "test-key-123";
pub const BASE_URL: &str = "http://upstream.test/v1/models";

/// Config pointing at a fake upstream with the given fallbacks
pub fn config(fallbacks: &[&str]) -> ProxyConfig
{   let mut config = ProxyConfig::default();
    config.upstream.api_key = API_KEY.to_string();
    config.upstream.base_url = BASE_URL.to_string();
    config.models.fallbacks
      = fallbacks.iter().map(|m| m.to_string()).collect();
    config
}

/// Upstream answer carrying `text` as the first candidate
pub fn success(text: &str) -> TransportResult
{   ok(json!({
      "candidates": [{
        "content": { "role": "model", "parts": [{ "text": text }] },
        "finishReason": "STOP"
      }]
    }))
}

/// Legacy message-shape answer
pub fn message_success(text: &str) -> TransportResult
{   ok(json!({
      "candidates": [{ "author": "1", "content": text }]
    }))
}

pub fn ok(body: serde_json::Value) -> TransportResult
{   Ok(TransportResponse { status: 200, body })
}

pub fn status(code: u16, message: &str) -> TransportResult
{   Err(TransportError::status(
      code,
      json!({ "error": { "code": code, "message": message } })
    ))
}

pub fn not_found() -> TransportResult
{   status(404, "Model not found")
}

/// Transport that replays a fixed script and records every call
pub struct ScriptedTransport
{   replies: Mutex<VecDeque<TransportResult>>
  , calls: Mutex<Vec<TransportRequest>>
}

impl ScriptedTransport
{   pub fn new(replies: Vec<TransportResult>) -> Arc<Self>
    {   Arc::new(ScriptedTransport
        {   replies: Mutex::new(replies.into())
          , calls: Mutex::new(Vec::new())
        })
    }

    pub fn calls(&self) -> Vec<TransportRequest>
    {   self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize
    {   self.calls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String>
    {   self.calls().into_iter().map(|c| c.url).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport
{   async fn call(&self, request: TransportRequest) -> TransportResult
    {   self.calls.lock().unwrap().push(request);
        self.replies.lock().unwrap()
          .pop_front()
          .unwrap_or_else(|| Err(TransportError::network("script exhausted")))
    }
}

/// Transport that never answers
#[derive(Default)]
pub struct HangingTransport
{   calls: Mutex<usize>
}

impl HangingTransport
{   pub fn call_count(&self) -> usize
    {   *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for HangingTransport
{   async fn call(&self, _request: TransportRequest) -> TransportResult
    {   *self.calls.lock().unwrap() += 1;
        std::future::pending().await
    }
}
