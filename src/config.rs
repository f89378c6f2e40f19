//! Configuration for the upstream API, model fallbacks and the server

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::failover::TransientPolicy;
use crate::providers::gemini::is_model_id;
use crate::CallShape;

pub const DEFAULT_BASE_URL: &str
  = "https://generativelanguage.googleapis.com/v1/models";

/// Upstream API location and credential
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig
{   /// Base URL up to and including `/models`
    pub base_url: String
  , /// API key, sent as the `key` query parameter
    pub api_key: String
}

impl Default for UpstreamConfig
{   fn default() -> Self
    {   UpstreamConfig
        {   base_url: DEFAULT_BASE_URL.to_string()
          , api_key: String::new()
        }
    }
}

// The key must never end up in a log line.
impl fmt::Debug for UpstreamConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("UpstreamConfig")
          .field("base_url", &self.base_url)
          .field("api_key", &"***")
          .finish()
    }
}

/// Which models to try, in which order, with which call shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig
{   /// Used as the hint when the caller sends no model
    pub preferred: Option<String>
  , /// Ordered fallback list, most capable first
    pub fallbacks: Vec<String>
  , /// Shape tried first for models without an override
    pub default_shape: CallShape
  , /// Per-model first shape
    pub shape_overrides: HashMap<String, CallShape>
}

impl Default for ModelConfig
{   fn default() -> Self
    {   ModelConfig
        {   preferred: None
          , fallbacks: vec!["gemini-pro".to_string()]
          , default_shape: CallShape::ContentGeneration
          , shape_overrides: HashMap::new()
        }
    }
}

/// Per-attempt timeouts, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig
{   pub list_ms: u64
  , pub generate_ms: u64
}

impl TimeoutConfig
{   pub fn list(&self) -> Duration
    {   Duration::from_millis(self.list_ms)
    }

    pub fn generate(&self) -> Duration
    {   Duration::from_millis(self.generate_ms)
    }
}

impl Default for TimeoutConfig
{   fn default() -> Self
    {   TimeoutConfig
        {   list_ms: 20_000
          , generate_ms: 30_000
        }
    }
}

/// Sampling defaults applied when the caller leaves a value out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig
{   pub temperature: f64
  , pub max_output_tokens: u32
  , pub top_p: Option<f64>
  , pub top_k: Option<u32>
}

impl Default for SamplingConfig
{   fn default() -> Self
    {   SamplingConfig
        {   temperature: 0.4
          , max_output_tokens: 300
          , top_p: Some(0.8)
          , top_k: Some(40)
        }
    }
}

/// Failover configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig
{   /// What a transient upstream error does to the candidate loop
    pub transient: TransientPolicy
}

/// Human readable answers returned when upstream refuses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefusalConfig
{   /// Safety-policy block
    pub safety: String
  , /// Empty candidate list
    pub no_candidates: String
  , /// Anything else; `{reason}` is replaced by the upstream reason
    pub generic: String
}

impl Default for RefusalConfig
{   fn default() -> Self
    {   RefusalConfig
        {   safety: "Sorry, I can't answer that. The request was \
                     blocked by the content safety policy."
              .to_string()
          , no_candidates: "Sorry, no answer could be produced for \
                            this prompt. Please try rephrasing it."
              .to_string()
          , generic: "No answer produced, reason: {reason}"
              .to_string()
        }
    }
}

/// Listening address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig
{   pub host: String
  , pub port: u16
}

impl Default for ServerConfig
{   fn default() -> Self
    {   ServerConfig
        {   host: "0.0.0.0".to_string()
          , port: 3000
        }
    }
}

/// Proxy configuration.
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig
{   pub upstream: UpstreamConfig
  , pub models: ModelConfig
  , pub timeouts: TimeoutConfig
  , pub sampling: SamplingConfig
  , /// Passed to upstream untouched
    pub safety_settings: Vec<serde_json::Value>
  , pub failover: FailoverConfig
  , pub refusals: RefusalConfig
  , pub server: ServerConfig
}

impl ProxyConfig
{   /// Load the process configuration.
    /// `GLPROXY_CONFIG` names an optional JSON file; environment
    /// variables are applied on top of it.
    pub fn load() -> Result<Self, Error>
    {   let mut config = match std::env::var("GLPROXY_CONFIG")
        {   Ok(path) => ProxyConfig::from_file(&path)?
          , Err(_) => ProxyConfig::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment variables
    pub fn from_env() -> Result<Self, Error>
    {   let mut config = ProxyConfig::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Reading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
          Error::InvalidConfiguration(
            format!("cannot read {}: {}", path.display(), e)
          )
        })?;
        serde_json::from_str(&text).map_err(|e| {
          Error::InvalidConfiguration(
            format!("cannot parse {}: {}", path.display(), e)
          )
        })
    }

    /// Override fields from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where F: Fn(&str) -> Option<String>
    {   if let Some(key) = lookup("GEMINI_API_KEY")
        {   self.upstream.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup("GEMINI_BASE_URL")
        {   self.upstream.base_url
              = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("GEMINI_MODEL")
        {   let model = model.trim();
            self.models.preferred = if model.is_empty()
            {   None
            } else
            {   Some(model.to_string())
            };
        }
        if let Some(list) = lookup("GEMINI_FALLBACK_MODELS")
        {   self.models.fallbacks = parse_model_list(&list);
        }
        if let Some(ms) = lookup("GEMINI_LIST_TIMEOUT_MS")
        {   self.timeouts.list_ms
              = parse_number("GEMINI_LIST_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("GEMINI_GENERATE_TIMEOUT_MS")
        {   self.timeouts.generate_ms
              = parse_number("GEMINI_GENERATE_TIMEOUT_MS", &ms)?;
        }
        if let Some(host) = lookup("HOST")
        {   self.server.host = host.trim().to_string();
        }
        if let Some(port) = lookup("PORT")
        {   self.server.port = parse_number("PORT", &port)?;
        }
        Ok(())
    }

    /// Reject settings the proxy cannot run with
    pub fn validate(&self) -> Result<(), Error>
    {   if self.upstream.api_key.is_empty()
        {   return Err(Error::InvalidConfiguration(
              "GEMINI_API_KEY is missing".to_string()
            ));
        }
        if self.upstream.base_url.is_empty()
        {   return Err(Error::InvalidConfiguration(
              "upstream base URL is empty".to_string()
            ));
        }
        if self.timeouts.list_ms == 0 || self.timeouts.generate_ms == 0
        {   return Err(Error::InvalidConfiguration(
              "timeouts must be greater than zero".to_string()
            ));
        }
        if !(0.0..=2.0).contains(&self.sampling.temperature)
        {   return Err(Error::InvalidConfiguration(
              format!(
                "default temperature {} outside [0, 2]",
                self.sampling.temperature
              )
            ));
        }
        if self.sampling.max_output_tokens == 0
        {   return Err(Error::InvalidConfiguration(
              "default maxOutputTokens must be positive".to_string()
            ));
        }
        if let Some(bad) = self.models.preferred.iter()
          .chain(self.models.fallbacks.iter())
          .find(|m| !is_model_id(m))
        {   return Err(Error::InvalidConfiguration(
              format!("not a model name: {:?}", bad)
            ));
        }
        if self.models.preferred.is_none() && self.models.fallbacks.is_empty()
        {   warn!(
              "No preferred or fallback models configured; \
               requests without a model hint will fail"
            );
        }
        Ok(())
    }
}

/// Split a comma separated model list, dropping blanks
pub fn parse_model_list(list: &str) -> Vec<String>
{   list.split(',')
      .map(str::trim)
      .filter(|m| !m.is_empty())
      .map(str::to_string)
      .collect()
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str)
  -> Result<T, Error>
{   value.trim().parse().map_err(|_| {
      Error::InvalidConfiguration(
        format!("{} is not a valid number: {}", name, value)
      )
    })
}
