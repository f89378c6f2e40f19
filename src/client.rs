use std::sync::Arc;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::classifier::{classify, refusal_message};
use crate::config::ProxyConfig;
use crate::error::Error;
use crate::failover::EndpointResolver;
use crate::providers::gemini::{build_body, error_message, generate_url,
                               list_url};
use crate::request::{GenerationRequest, GenerationResult};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::{CallShape, CandidateEndpoint, UpstreamOutcome};

/// Generation orchestrator.
///
/// Holds only read-only state, so one instance is shared by every
/// inbound request. Candidates are tried one at a time; the worst case
/// latency is `candidates x generate timeout` (plus one extra attempt
/// per candidate whose call shape is rejected), there is no overall
/// deadline.
pub struct ProxyClient
{   config: Arc<ProxyConfig>
  , resolver: EndpointResolver
  , transport: Arc<dyn Transport>
}

impl ProxyClient
{   /// Client talking to the real upstream over HTTP
    pub fn new(config: ProxyConfig) -> Self
    {   ProxyClient::with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(
      config: ProxyConfig
    , transport: Arc<dyn Transport>
    ) -> Self
    {   debug!("Creating ProxyClient for {}", config.upstream.base_url);
        let resolver = EndpointResolver::from_config(&config.models);
        ProxyClient
        {   config: Arc::new(config)
          , resolver
          , transport
        }
    }

    pub fn config(&self) -> &ProxyConfig
    {   &self.config
    }

    /// Generate text; always resolves to output or an error result
    pub async fn generate(&self, request: &GenerationRequest)
      -> GenerationResult
    {   self.generate_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like `generate`, but gives up on the in-flight attempt and the
    /// remaining candidates once `cancel` fires
    pub async fn generate_with_cancel(
      &self
    , request: &GenerationRequest
    , cancel: &CancellationToken
    ) -> GenerationResult
    {   match self.try_generate(request, cancel).await
        {   Ok(text) => GenerationResult::output(text)
          , Err(e) => {
              match &e
              {   Error::ClientInput(_) | Error::Cancelled => {
                    debug!("Generation ended early: {}", e)
                  }
                , _ => error!("Generation failed: {}", e)
              }
              GenerationResult::failure(&e)
            }
        }
    }

    async fn try_generate(
      &self
    , request: &GenerationRequest
    , cancel: &CancellationToken
    ) -> Result<String, Error>
    {   if request.prompt_text.trim().is_empty()
        {   return Err(Error::ClientInput(
              "Prompt is required".to_string()
            ));
        }

        let candidates = self.resolver.candidates(request)?;
        let policy = self.config.failover.transient;
        let mut prior_misses = 0;

        for candidate in &candidates
        {   let outcome = self
              .attempt_candidate(request, candidate, cancel)
              .await?;

            match outcome
            {   UpstreamOutcome::Success { text } => {
                  info!("Model {} answered", candidate.model_id);
                  return Ok(text);
                }
              , UpstreamOutcome::Filtered { reason } => {
                  info!(
                    "Model {} refused to answer: {:?}",
                    candidate.model_id, reason
                  );
                  return Ok(refusal_message(&self.config.refusals, &reason));
                }
              , UpstreamOutcome::AuthError => {
                  warn!("Upstream rejected the API key, not trying other models");
                  return Err(Error::UpstreamAuth);
                }
              , UpstreamOutcome::NotFound
              | UpstreamOutcome::ShapeMismatch { .. } => {
                  warn!("Model {} not available", candidate.model_id);
                }
              , UpstreamOutcome::TransientError { status, message } => {
                  warn!(
                    "Model {} failed with status {}: {}",
                    candidate.model_id, status, message
                  );
                  if !policy.should_continue(prior_misses)
                  {   return Err(Error::UpstreamTransient { status, message });
                  }
                }
            }
            prior_misses += 1;
        }

        // Ran out of candidates: reported as the last model missing
        Err(Error::UpstreamNotFound(
          candidates.last()
            .map(|c| c.model_id.clone())
            .unwrap_or_default()
        ))
    }

    /// One candidate: its declared shape, then at most one retry with
    /// the other shape if upstream rejects the first one
    async fn attempt_candidate(
      &self
    , request: &GenerationRequest
    , candidate: &CandidateEndpoint
    , cancel: &CancellationToken
    ) -> Result<UpstreamOutcome, Error>
    {   let outcome = self
          .attempt(request, &candidate.model_id, candidate.call_shape, cancel)
          .await?;

        if let UpstreamOutcome::ShapeMismatch { message } = &outcome
        {   let other = candidate.call_shape.other();
            info!(
              "Model {} rejected {:?} ({}), retrying with {:?}",
              candidate.model_id, candidate.call_shape, message, other
            );
            let retry = self
              .attempt(request, &candidate.model_id, other, cancel)
              .await?;
            return Ok(match retry
            {   UpstreamOutcome::ShapeMismatch { .. } => UpstreamOutcome::NotFound
              , other => other
            });
        }
        Ok(outcome)
    }

    async fn attempt(
      &self
    , request: &GenerationRequest
    , model: &str
    , shape: CallShape
    , cancel: &CancellationToken
    ) -> Result<UpstreamOutcome, Error>
    {   let body = build_body(
          shape
        , request
        , &self.config.sampling
        , &self.config.safety_settings
        )?;
        let url = generate_url(
          &self.config.upstream.base_url
        , model
        , shape
        , &self.config.upstream.api_key
        );
        info!("Generating with model: {} ({})", model, shape.method());

        let call = self.transport.call(TransportRequest::post(
          url
        , body
        , self.config.timeouts.generate()
        ));
        let result = tokio::select!
        {   biased;
            _ = cancel.cancelled() => {
              warn!("Caller went away while waiting on {}", model);
              return Err(Error::Cancelled);
            }
          , result = call => { result }
        };

        let outcome = classify(shape, &result);
        debug!("Model {} outcome: {:?}", model, outcome);
        Ok(outcome)
    }

    /// Upstream model listing, passed through as is.
    /// Failures keep the upstream status (500 when there is none).
    pub async fn list_models(&self) -> Result<serde_json::Value, Error>
    {   debug!("Listing upstream models");
        let url = list_url(
          &self.config.upstream.base_url
        , &self.config.upstream.api_key
        );
        match self.transport
          .call(TransportRequest::get(url, self.config.timeouts.list()))
          .await
        {   Ok(response) => Ok(response.body)
          , Err(e) => {
              error!("Models API error: {}", e.message);
              Err(Error::UpstreamTransient
              {   status: e.status.unwrap_or(500)
                , message: e.body.as_ref()
                    .and_then(error_message)
                    .unwrap_or_else(|| "Failed to fetch models".to_string())
              })
            }
        }
    }
}
