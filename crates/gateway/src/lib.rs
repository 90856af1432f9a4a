//! AI gateway plumbing: chat completions, reply shaping, speech synthesis and
//! the incremental reader for streamed completions.

/// Chat-completion client
pub mod client;

/// JSON span extraction from free-text replies
pub mod extract;

/// Prompt builders, one per serverless function
pub mod prompts;

/// Text-to-speech client
pub mod speech;

/// Server-sent-events reader
pub mod sse;

/// Gateway errors
pub mod errors;

pub use client::{ByteStream, CompletionRequest, Completions, GatewayClient, GatewayConfig, Message};
pub use errors::GatewayError;
pub use speech::{Speech, SpeechClient};
