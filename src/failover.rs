//! Candidate resolution and fallback policy

use std::collections::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::providers::gemini::bare_model_id;
use crate::request::GenerationRequest;
use crate::{CallShape, CandidateEndpoint};

/// What a transient upstream error does to the candidate loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientPolicy
{   /// Move on only when earlier candidates already failed with
    /// NotFound/TransientError; a transient error on the first
    /// candidate is surfaced as is
    #[default]
    ContinueAfterMiss
  , /// Always move on to the next candidate
    AlwaysContinue
  , /// Always surface the error
    StopImmediately
}

impl TransientPolicy
{   /// `prior_misses` counts candidates that already failed over
    pub fn should_continue(&self, prior_misses: usize) -> bool
    {   match self
        {   TransientPolicy::ContinueAfterMiss => prior_misses > 0
          , TransientPolicy::AlwaysContinue => true
          , TransientPolicy::StopImmediately => false
        }
    }
}

/// Produces the ordered candidate list for a request.
/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct EndpointResolver
{   preferred: Option<String>
  , fallbacks: Vec<String>
  , default_shape: CallShape
  , shape_overrides: HashMap<String, CallShape>
}

impl EndpointResolver
{   /// Resolver over a plain fallback list
    pub fn new(fallbacks: Vec<String>) -> Self
    {   EndpointResolver
        {   preferred: None
          , fallbacks
          , default_shape: CallShape::ContentGeneration
          , shape_overrides: HashMap::new()
        }
    }

    pub fn from_config(models: &ModelConfig) -> Self
    {   debug!(
          "Creating resolver with {} fallback models",
          models.fallbacks.len()
        );
        EndpointResolver
        {   preferred: models.preferred.clone()
          , fallbacks: models.fallbacks.clone()
          , default_shape: models.default_shape
          , shape_overrides: models.shape_overrides.iter()
              .map(|(model, shape)| (bare_model_id(model).to_string(), *shape))
              .collect()
        }
    }

    pub fn with_shape(mut self, model: impl Into<String>, shape: CallShape)
      -> Self
    {   self.shape_overrides.insert(model.into(), shape);
        self
    }

    fn shape_for(&self, model: &str) -> CallShape
    {   self.shape_overrides
          .get(model)
          .copied()
          .unwrap_or(self.default_shape)
    }

    /// Hint first (the caller's, else the configured preference),
    /// then the fallback list without duplicates. Ids are compared
    /// without the `models/` prefix. Never returns an empty list.
    pub fn candidates(&self, request: &GenerationRequest)
      -> Result<Vec<CandidateEndpoint>, crate::error::Error>
    {   let hint = request.model_hint.as_deref()
          .or(self.preferred.as_deref());

        let mut models: Vec<&str> = Vec::new();
        for model in hint.into_iter()
          .chain(self.fallbacks.iter().map(String::as_str))
          .map(bare_model_id)
        {   if !models.contains(&model)
            {   models.push(model);
            }
        }

        if models.is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "no model hint and no fallback models configured"
                .to_string()
            ));
        }

        let candidates: Vec<CandidateEndpoint> = models
          .into_iter()
          .map(|m| CandidateEndpoint::new(m, self.shape_for(m)))
          .collect();
        debug!(
          "Resolved candidates: {:?}",
          candidates.iter().map(|c| &c.model_id).collect::<Vec<_>>()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::Error;

    fn request(hint: Option<&str>) -> GenerationRequest
    {   GenerationRequest::new(hint.map(str::to_string), "hi", 0.4, 300)
          .unwrap()
    }

    fn ids(c: &[CandidateEndpoint]) -> Vec<&str>
    {   c.iter().map(|c| c.model_id.as_str()).collect()
    }

    #[test]
    fn hint_comes_first_and_is_deduplicated()
    {   let resolver = EndpointResolver::new(vec![
          "gemini-1.5-pro".to_string()
        , "gemini-pro".to_string()
        , "gemini-1.5-pro".to_string()
        ]);
        let c = resolver.candidates(&request(Some("gemini-pro"))).unwrap();
        assert_eq!(ids(&c), vec!["gemini-pro", "gemini-1.5-pro"]);
    }

    #[test]
    fn prefixed_hint_matches_plain_fallback()
    {   let resolver = EndpointResolver::new(vec![
          "gemini-pro".to_string()
        , "models/gemini-1.5-pro".to_string()
        , "gemini-1.5-pro".to_string()
        ]);
        let c = resolver.candidates(&request(Some("models/gemini-pro"))).unwrap();
        assert_eq!(ids(&c), vec!["gemini-pro", "gemini-1.5-pro"]);
    }

    #[test]
    fn no_hint_uses_preferred_then_fallbacks()
    {   let models = ModelConfig
        {   preferred: Some("gemini-1.5-flash".to_string())
          , fallbacks: vec!["gemini-pro".to_string()]
          , ..ModelConfig::default()
        };
        let resolver = EndpointResolver::from_config(&models);
        let c = resolver.candidates(&request(None)).unwrap();
        assert_eq!(ids(&c), vec!["gemini-1.5-flash", "gemini-pro"]);
    }

    #[test]
    fn empty_configuration_fails_fast()
    {   let resolver = EndpointResolver::new(vec![]);
        let err = resolver.candidates(&request(None)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn hint_alone_is_enough()
    {   let resolver = EndpointResolver::new(vec![]);
        let c = resolver.candidates(&request(Some("x"))).unwrap();
        assert_eq!(ids(&c), vec!["x"]);
    }

    #[test]
    fn shapes_follow_overrides()
    {   let resolver = EndpointResolver::new(vec![
          "gemini-pro".to_string()
        , "chat-bison-001".to_string()
        ]).with_shape("chat-bison-001", CallShape::MessageGeneration);
        let c = resolver.candidates(&request(None)).unwrap();
        assert_eq!(c[0].call_shape, CallShape::ContentGeneration);
        assert_eq!(c[1].call_shape, CallShape::MessageGeneration);
    }

    #[test]
    fn transient_policy_table()
    {   let p = TransientPolicy::ContinueAfterMiss;
        assert!(!p.should_continue(0));
        assert!(p.should_continue(1));
        assert!(TransientPolicy::AlwaysContinue.should_continue(0));
        assert!(!TransientPolicy::StopImmediately.should_continue(3));
    }
}
