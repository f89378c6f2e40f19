//! Inbound request, validated request and the normalized result

use serde::{Deserialize, Serialize};

use crate::config::SamplingConfig;
use crate::error::Error;
use crate::providers::gemini::is_model_id;

/// Body of `POST /api/generate` as the browser sends it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody
{   /// Model hint; blank means no hint
    #[serde(default)]
    pub model: Option<String>
  , /// Prompt text (`prompt` is accepted too)
    #[serde(default, alias = "prompt")]
    pub prompt_text: String
  , #[serde(default)]
    pub temperature: Option<f64>
  , #[serde(default)]
    pub max_output_tokens: Option<u32>
}

impl GenerateBody
{   /// Fill in sampling defaults and validate
    pub fn into_request(self, defaults: &SamplingConfig)
      -> Result<GenerationRequest, Error>
    {   GenerationRequest::new(
          self.model
        , self.prompt_text
        , self.temperature.unwrap_or(defaults.temperature)
        , self.max_output_tokens.unwrap_or(defaults.max_output_tokens)
        )
    }
}

/// A validated "generate text" request.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest
{   pub model_hint: Option<String>
  , pub prompt_text: String
  , pub temperature: f64
  , pub max_output_tokens: u32
}

impl GenerationRequest
{   pub fn new(
      model_hint: Option<String>
    , prompt_text: impl Into<String>
    , temperature: f64
    , max_output_tokens: u32
    ) -> Result<Self, Error>
    {   let prompt_text = prompt_text.into();
        if prompt_text.trim().is_empty()
        {   return Err(Error::ClientInput(
              "Prompt is required".to_string()
            ));
        }
        if !(0.0..=2.0).contains(&temperature)
        {   return Err(Error::ClientInput(
              format!("temperature must be within [0, 2], got {}", temperature)
            ));
        }
        if max_output_tokens == 0
        {   return Err(Error::ClientInput(
              "maxOutputTokens must be positive".to_string()
            ));
        }
        let model_hint = model_hint
          .map(|m| m.trim().to_string())
          .filter(|m| !m.is_empty());
        if let Some(model) = &model_hint
        {   if !is_model_id(model)
            {   return Err(Error::ClientInput(
                  format!("Invalid model name: {:?}", model)
                ));
            }
        }

        Ok(GenerationRequest
        {   model_hint
          , prompt_text
          , temperature
          , max_output_tokens
        })
    }
}

/// What the caller gets back: text, or an error with its status.
/// Refusals are text, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult
{   Output
    {   output_text: String
    }
  , Failure
    {   error_message: String
      , http_status: u16
    }
}

impl GenerationResult
{   pub fn output(text: impl Into<String>) -> Self
    {   GenerationResult::Output
        {   output_text: text.into()
        }
    }

    pub fn failure(err: &Error) -> Self
    {   GenerationResult::Failure
        {   error_message: err.public_message()
          , http_status: err.http_status()
        }
    }

    pub fn http_status(&self) -> u16
    {   match self
        {   GenerationResult::Output { .. } => 200
          , GenerationResult::Failure { http_status, .. } => *http_status
        }
    }

    pub fn is_output(&self) -> bool
    {   matches!(self, GenerationResult::Output { .. })
    }

    pub fn output_text(&self) -> Option<&str>
    {   match self
        {   GenerationResult::Output { output_text } => {
              Some(output_text.as_str())
            }
          , GenerationResult::Failure { .. } => None
        }
    }

    pub fn error_message(&self) -> Option<&str>
    {   match self
        {   GenerationResult::Output { .. } => None
          , GenerationResult::Failure { error_message, .. } => {
              Some(error_message.as_str())
            }
        }
    }
}

/// `200 { outputText }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBody
{   pub output_text: String
}

/// `{ error: { message } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail
{   pub message: String
}

/// Error body; carries the message both flat and nested so
/// older clients reading `error.message` keep working
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody
{   pub error_message: String
  , pub error: ErrorDetail
}

impl ErrorBody
{   pub fn new(message: impl Into<String>) -> Self
    {   let message = message.into();
        ErrorBody
        {   error_message: message.clone()
          , error: ErrorDetail { message }
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn blank_prompt_is_a_client_error()
    {   let err = GenerationRequest::new(None, "  \n\t", 0.4, 300)
          .unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.public_message(), "Prompt is required");
    }

    #[test]
    fn body_takes_defaults_and_alias()
    {   let body: GenerateBody = serde_json::from_str(
          r#"{ "model": "  ", "prompt": "Hello" }"#
        ).unwrap();
        let req = body.into_request(&SamplingConfig::default()).unwrap();
        assert_eq!(req.model_hint, None);
        assert_eq!(req.prompt_text, "Hello");
        assert_eq!(req.temperature, 0.4);
        assert_eq!(req.max_output_tokens, 300);
    }

    #[test]
    fn body_keeps_caller_sampling()
    {   let body: GenerateBody = serde_json::from_str(
          r#"{ "promptText": "Hi", "temperature": 1.5, "maxOutputTokens": 42 }"#
        ).unwrap();
        let req = body.into_request(&SamplingConfig::default()).unwrap();
        assert_eq!(req.temperature, 1.5);
        assert_eq!(req.max_output_tokens, 42);
    }

    #[test]
    fn out_of_range_temperature_rejected()
    {   assert!(GenerationRequest::new(None, "x", 2.5, 10).is_err());
        assert!(GenerationRequest::new(None, "x", 1.0, 0).is_err());
    }

    #[test]
    fn hint_must_be_a_model_id()
    {   let err = GenerationRequest::new(
          Some("../../v1beta/tunedModels/x:delete?y=".to_string()),
          "x", 0.4, 10
        ).unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(GenerationRequest::new(
          Some("gemini-pro?key=other".to_string()), "x", 0.4, 10
        ).is_err());

        let req = GenerationRequest::new(
          Some(" models/gemini-pro ".to_string()), "x", 0.4, 10
        ).unwrap();
        assert_eq!(req.model_hint.as_deref(), Some("models/gemini-pro"));
    }

    #[test]
    fn error_body_shape()
    {   let json = serde_json::to_value(ErrorBody::new("boom")).unwrap();
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["error"]["message"], "boom");
    }
}
