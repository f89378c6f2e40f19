use serde::{Deserialize, Serialize};
use log::trace;

use crate::config::SamplingConfig;
use crate::request::GenerationRequest;
use crate::CallShape;

// ===== URLs =====

/// Model names from the listing call come back as `models/<id>`
pub(crate) fn bare_model_id(model: &str) -> &str
{   model.strip_prefix("models/").unwrap_or(model)
}

/// `[models/]<id>` where the id is `[A-Za-z0-9._-]+` and not all dots.
/// Anything else would change the path or query of the upstream URL.
pub fn is_model_id(model: &str) -> bool
{   let id = bare_model_id(model);
    !id.is_empty()
      && id.chars().any(|c| c != '.')
      && id.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
}

/// `{base}/{model}:{method}?key={key}`
pub fn generate_url(
  base_url: &str
, model: &str
, shape: CallShape
, api_key: &str
) -> String
{   format!(
      "{}/{}:{}?key={}",
      base_url.trim_end_matches('/'),
      bare_model_id(model),
      shape.method(),
      api_key
    )
}

/// `{base}?key={key}`
pub fn list_url(base_url: &str, api_key: &str) -> String
{   format!("{}?key={}", base_url.trim_end_matches('/'), api_key)
}

/// Replace the `key` query value so a URL can be logged
pub fn redact(url: &str) -> String
{   match url.find("key=")
    {   Some(start) => {
          let value_start = start + "key=".len();
          let value_end = url[value_start..]
            .find('&')
            .map(|i| value_start + i)
            .unwrap_or(url.len());
          format!("{}***{}", &url[..value_start], &url[value_end..])
        }
      , None => url.to_string()
    }
}

// ===== Request Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>
  , #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig
{   pub temperature: f64
  , pub max_output_tokens: u32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>
}

/// `:generateContent` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest
{   pub contents: Vec<Content>
  , pub generation_config: GenerationConfig
  , #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<serde_json::Value>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>
  , #[serde(default)]
    pub content: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePrompt
{   pub messages: Vec<Message>
}

/// `:generateMessage` body (older API generation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMessageRequest
{   pub prompt: MessagePrompt
  , pub temperature: f64
  , pub max_output_tokens: u32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>
  , pub candidate_count: u32
}

/// Build the outbound body for one attempt.
/// Caller sampling values go out unchanged; top-p/top-k and safety
/// settings come from configuration. The message shape has no
/// safety settings field upstream, so they are only sent with
/// the content shape.
pub fn build_body(
  shape: CallShape
, request: &GenerationRequest
, sampling: &SamplingConfig
, safety_settings: &[serde_json::Value]
) -> Result<serde_json::Value, serde_json::Error>
{   let body = match shape
    {   CallShape::ContentGeneration => {
          serde_json::to_value(GenerateContentRequest
          {   contents: vec![
                Content
                {   role: Some("user".to_string())
                  , parts: vec![
                      Part { text: Some(request.prompt_text.clone()) }
                    ]
                }
              ]
            , generation_config: GenerationConfig
              {   temperature: request.temperature
                , max_output_tokens: request.max_output_tokens
                , top_p: sampling.top_p
                , top_k: sampling.top_k
              }
            , safety_settings: safety_settings.to_vec()
          })?
        }
      , CallShape::MessageGeneration => {
          serde_json::to_value(GenerateMessageRequest
          {   prompt: MessagePrompt
              {   messages: vec![
                    Message
                    {   author: None
                      , content: request.prompt_text.clone()
                    }
                  ]
              }
            , temperature: request.temperature
            , max_output_tokens: request.max_output_tokens
            , top_p: sampling.top_p
            , top_k: sampling.top_k
            , candidate_count: 1
          })?
        }
    };
    trace!("Upstream body ({:?}): {}", shape, body);
    Ok(body)
}

// ===== Response Types =====

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCandidate
{   #[serde(default)]
    pub content: Option<Content>
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback
{   #[serde(default)]
    pub block_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<ContentCandidate>
  , #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentFilter
{   #[serde(default)]
    pub reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateMessageResponse
{   #[serde(default)]
    pub candidates: Vec<Message>
  , #[serde(default)]
    pub filters: Vec<ContentFilter>
}

/// The part of an upstream answer the classifier cares about,
/// independent of call shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplySummary
{   /// Number of candidates upstream returned
    pub candidate_count: usize
  , /// Text of the first candidate, if it has any
    pub text: Option<String>
  , /// Finish or filter reason reported for the first candidate
    pub finish_reason: Option<String>
}

/// Pull the first candidate out of a successful response body
pub fn summarize(shape: CallShape, body: &serde_json::Value)
  -> Result<ReplySummary, serde_json::Error>
{   match shape
    {   CallShape::ContentGeneration => {
          let response: GenerateContentResponse
            = serde_json::from_value(body.clone())?;
          let first = response.candidates.first();
          let text = first
            .and_then(|c| c.content.as_ref())
            .map(|content| {
              content.parts.iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
            })
            .filter(|t| !t.trim().is_empty());
          let finish_reason = first
            .and_then(|c| c.finish_reason.clone())
            .or_else(|| {
              response.prompt_feedback.as_ref()
                .and_then(|f| f.block_reason.clone())
            });
          Ok(ReplySummary
          {   candidate_count: response.candidates.len()
            , text
            , finish_reason
          })
        }
      , CallShape::MessageGeneration => {
          let response: GenerateMessageResponse
            = serde_json::from_value(body.clone())?;
          let text = response.candidates.first()
            .map(|m| m.content.clone())
            .filter(|t| !t.trim().is_empty());
          let finish_reason = response.filters.first()
            .and_then(|f| f.reason.clone());
          Ok(ReplySummary
          {   candidate_count: response.candidates.len()
            , text
            , finish_reason
          })
        }
    }
}

/// `error.message` from an upstream error body
pub fn error_message(body: &serde_json::Value) -> Option<String>
{   body.get("error")
      .and_then(|e| e.get("message"))
      .and_then(|m| m.as_str())
      .map(str::to_string)
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn request() -> GenerationRequest
    {   GenerationRequest::new(None, "Tell me a joke", 0.9, 128).unwrap()
    }

    #[test]
    fn urls_are_built_and_redacted()
    {   let url = generate_url(
          "https://host/v1/models/",
          "models/gemini-pro",
          CallShape::ContentGeneration,
          "SECRET"
        );
        assert_eq!(
          url,
          "https://host/v1/models/gemini-pro:generateContent?key=SECRET"
        );
        assert_eq!(
          redact(&url),
          "https://host/v1/models/gemini-pro:generateContent?key=***"
        );
        assert_eq!(redact("http://x/?key=a&b=c"), "http://x/?key=***&b=c");
        assert_eq!(list_url("https://host/v1/models", "k"), "https://host/v1/models?key=k");
    }

    #[test]
    fn model_ids_cannot_escape_the_path()
    {   assert!(is_model_id("gemini-1.5-pro"));
        assert!(is_model_id("models/gemini-pro"));
        assert!(is_model_id("chat-bison_001"));
        assert!(!is_model_id("../../v1beta/tunedModels/x:delete?y="));
        assert!(!is_model_id(".."));
        assert!(!is_model_id("models/"));
        assert!(!is_model_id("gemini-pro?alt=sse"));
        assert!(!is_model_id("gemini-pro#frag"));
        assert!(!is_model_id("a&key=other"));
        assert!(!is_model_id("tunedModels/x"));
    }

    #[test]
    fn content_body_shape()
    {   let safety = vec![json!({
          "category": "HARM_CATEGORY_HARASSMENT",
          "threshold": "BLOCK_ONLY_HIGH"
        })];
        let body = build_body(
          CallShape::ContentGeneration,
          &request(),
          &SamplingConfig::default(),
          &safety
        ).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Tell me a joke");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 128);
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["safetySettings"], json!(safety));
    }

    #[test]
    fn message_body_shape()
    {   let body = build_body(
          CallShape::MessageGeneration,
          &request(),
          &SamplingConfig::default(),
          &[]
        ).unwrap();
        assert_eq!(body["prompt"]["messages"][0]["content"], "Tell me a joke");
        assert_eq!(body["maxOutputTokens"], 128);
        assert_eq!(body["candidateCount"], 1);
        assert!(body.get("safetySettings").is_none());
    }

    #[test]
    fn summarize_content_joins_parts()
    {   let body = json!({
          "candidates": [{
            "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] },
            "finishReason": "STOP"
          }]
        });
        let s = summarize(CallShape::ContentGeneration, &body).unwrap();
        assert_eq!(s.candidate_count, 1);
        assert_eq!(s.text.as_deref(), Some("Hello, world"));
        assert_eq!(s.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn summarize_message_reads_filters()
    {   let body = json!({
          "candidates": [],
          "filters": [{ "reason": "OTHER" }]
        });
        let s = summarize(CallShape::MessageGeneration, &body).unwrap();
        assert_eq!(s.candidate_count, 0);
        assert_eq!(s.text, None);
        assert_eq!(s.finish_reason.as_deref(), Some("OTHER"));
    }

    #[test]
    fn error_message_from_body()
    {   let body = json!({ "error": { "code": 400, "message": "bad" } });
        assert_eq!(error_message(&body).as_deref(), Some("bad"));
        assert_eq!(error_message(&json!({})), None);
    }
}
