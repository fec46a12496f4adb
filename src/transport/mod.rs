//! HTTP transport layer.
//!
//! Provides the transport abstraction used to issue the streaming
//! chat-completions request, and the decoder that turns the response body
//! into text deltas.

mod http;
mod streaming;

pub use http::{HttpRequest, HttpTransport, HttpTransportImpl};
pub use streaming::{
    classify_line, decode_stream, extract_delta, ByteStream, DeltaStream, LineDecoder, SseDecoder,
    SseLine, StreamingResponse, Utf8Decoder, DONE_SENTINEL,
};

use std::time::Duration;

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection error.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// Invalid response.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}

impl From<TransportError> for crate::errors::CouncilError {
    fn from(err: TransportError) -> Self {
        crate::errors::CouncilError::Network {
            message: err.to_string(),
        }
    }
}
