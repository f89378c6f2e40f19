pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod failover;
pub mod transport;
pub mod classifier;
pub mod client;
pub mod server;
use serde::{Deserialize, Serialize};

/*

glproxy (Generative Language proxy) sits between a browser client and
the upstream generative-language API so the API key never leaves the
server, and so the client always gets one normalized answer no matter
which upstream model ended up serving it.

glproxy/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Shared structures and re-exports
│   ├── main.rs         # Binary bootstrap
│   ├── error.rs        # Error taxonomy and HTTP status mapping
│   ├── config.rs       # Upstream, model list, timeouts, sampling
│   ├── request.rs      # Inbound/outbound request and result types
│   ├── failover.rs     # Endpoint resolver and continuation policy
│   ├── transport.rs    # Black-box upstream call primitive
│   ├── classifier.rs   # Upstream response -> UpstreamOutcome
│   ├── client.rs       # Generation orchestrator
│   ├── server.rs       # axum routes
│   └── providers/      # Upstream wire formats
│       ├── mod.rs
│       └── gemini.rs
└── tests/

*/

pub use client::ProxyClient;
pub use config::ProxyConfig;
pub use error::Error;
pub use failover::{EndpointResolver, TransientPolicy};
pub use request::{GenerateBody, GenerationRequest, GenerationResult};
pub use transport::{HttpTransport, Transport, TransportError,
                    TransportRequest, TransportResponse};

/// GLPROXY STRUCTURES:

/// The two body shapes the upstream accepts.
/// The API grew a structured "contents/parts" call on top of the
/// older "messages" call and some models only answer one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape
{   /// `:generateContent` with `contents[].parts[].text`
    #[serde(alias = "content")]
    ContentGeneration
  , /// `:generateMessage` with `prompt.messages[].content`
    #[serde(alias = "message")]
    MessageGeneration
}

impl CallShape
{   /// Upstream method name appended to the model path
    pub fn method(&self) -> &'static str
    {   match self
        {   CallShape::ContentGeneration => "generateContent"
          , CallShape::MessageGeneration => "generateMessage"
        }
    }

    /// The shape to try when this one is rejected
    pub fn other(&self) -> CallShape
    {   match self
        {   CallShape::ContentGeneration => CallShape::MessageGeneration
          , CallShape::MessageGeneration => CallShape::ContentGeneration
        }
    }
}

/// One upstream model plus the shape used to call it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEndpoint
{   pub model_id: String
  , pub call_shape: CallShape
}

impl CandidateEndpoint
{   pub fn new(model_id: impl Into<String>, call_shape: CallShape) -> Self
    {   CandidateEndpoint
        {   model_id: model_id.into()
          , call_shape
        }
    }
}

/// Why upstream declined to produce text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason
{   /// Response carried no candidates at all
    NoCandidates
  , /// Safety policy block (finish reason `SAFETY` or similar)
    Safety
  , /// Some other finish/block reason reported by upstream
    Other(String)
}

/// Result of a single attempt, after classification.
/// Consumed by the orchestrator right away, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome
{   Success
    {   text: String
    }
  , Filtered
    {   reason: FilterReason
    }
  , NotFound
  , AuthError
  , TransientError
    {   status: u16
      , message: String
    }
  , /// The model exists but rejected this call shape
    ShapeMismatch
    {   message: String
    }
}
