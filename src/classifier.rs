//! Turns a transport result into an `UpstreamOutcome`

use log::{debug, warn};

use crate::config::RefusalConfig;
use crate::providers::gemini::summarize;
use crate::transport::TransportResult;
use crate::{CallShape, FilterReason, UpstreamOutcome};

/// Finish/block reasons that mean a content-policy refusal
const SAFETY_REASONS: &[&str] = &[
  "SAFETY"
, "BLOCKLIST"
, "PROHIBITED_CONTENT"
, "SPII"
];

/// Phrases upstream uses when a model rejects the call shape
/// rather than being absent
const SHAPE_MISMATCH_HINTS: &[&str] = &[
  "not supported for"
, "supported methods"
, "Unknown name"
];

pub fn filter_reason(code: &str) -> FilterReason
{   if SAFETY_REASONS.iter().any(|r| r.eq_ignore_ascii_case(code))
    {   FilterReason::Safety
    } else
    {   FilterReason::Other(code.to_string())
    }
}

fn is_shape_mismatch(status: u16, message: &str) -> bool
{   (status == 400 || status == 404)
      && SHAPE_MISMATCH_HINTS.iter().any(|h| message.contains(h))
}

/// Classify one attempt made with `shape`
pub fn classify(shape: CallShape, result: &TransportResult)
  -> UpstreamOutcome
{   match result
    {   Ok(response) => {
          let summary = match summarize(shape, &response.body)
          {   Ok(summary) => summary
            , Err(e) => {
                warn!("Unreadable upstream response: {}", e);
                return UpstreamOutcome::TransientError
                {   status: 500
                  , message: "Upstream returned an unreadable response"
                      .to_string()
                };
              }
          };
          debug!(
            "Upstream returned {} candidates, finish reason {:?}",
            summary.candidate_count, summary.finish_reason
          );

          if summary.candidate_count == 0
          {   return UpstreamOutcome::Filtered
              {   reason: FilterReason::NoCandidates
              };
          }
          match (summary.text, summary.finish_reason)
          {   (Some(text), _) => UpstreamOutcome::Success
              {   text: text.trim().to_string()
              }
            , (None, Some(reason)) => UpstreamOutcome::Filtered
              {   reason: filter_reason(&reason)
              }
            , (None, None) => UpstreamOutcome::Filtered
              {   reason: FilterReason::Other("EMPTY_RESPONSE".to_string())
              }
          }
        }
      , Err(e) => match e.status
        {   Some(status) if is_shape_mismatch(status, &e.message) => {
              UpstreamOutcome::ShapeMismatch
              {   message: e.message.clone()
              }
            }
          , Some(404) => UpstreamOutcome::NotFound
          , Some(403) => UpstreamOutcome::AuthError
          , status => UpstreamOutcome::TransientError
            {   status: status.unwrap_or(500)
              , message: e.message.clone()
            }
        }
    }
}

/// Text handed to the caller when upstream refused to answer
pub fn refusal_message(refusals: &RefusalConfig, reason: &FilterReason)
  -> String
{   match reason
    {   FilterReason::Safety => refusals.safety.clone()
      , FilterReason::NoCandidates => refusals.no_candidates.clone()
      , FilterReason::Other(code) => refusals.generic.replace("{reason}", code)
    }
}
