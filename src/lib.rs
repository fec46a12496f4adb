//! Product Council
//!
//! Streams a structured product-strategy critique from any OpenAI-compatible
//! chat-completions endpoint. A [`ProductContext`] (audience, goal, product
//! type, lifecycle stage and up to five screenshots) is turned into a
//! multimodal prompt, sent with `stream: true`, and the server-sent-event
//! response is decoded into text deltas as they arrive.
//!
//! # Features
//!
//! - **Robust SSE decoding**: records split across chunks, multi-byte
//!   characters split across chunks, keepalives and malformed records are
//!   all handled without losing text
//! - **Any compatible endpoint**: base URLs are normalised to
//!   `.../v1/chat/completions`
//! - **Cancellation**: an in-flight report can be aborted through a token
//! - **Persisted settings**: base URL, key and model are stored as one JSON blob
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use product_council::{ApiConfig, ProductContext, ReportOrchestrator, ReportService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApiConfig::builder()
//!         .base_url("https://api.openai.com/v1")
//!         .api_key("sk-your-key")
//!         .build()?;
//!
//!     let service = ReportService::from_config(&config)?;
//!     let mut council = ReportOrchestrator::new(service, config);
//!     council.set_context(
//!         ProductContext::new()
//!             .with_target_audience("Enterprise IT Admins")
//!             .with_primary_goal("Reduce churn by 5%"),
//!     );
//!
//!     council.run_analysis(|chunk| print!("{}", chunk)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Decoding a raw stream
//!
//! ```rust
//! use bytes::Bytes;
//! use product_council::transport::{decode_stream, TransportError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let body = vec![
//!     Ok::<_, TransportError>(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"Hel")),
//!     Ok(Bytes::from("lo\"}}]}\n\ndata: [DONE]\n\n")),
//! ];
//!
//! let text = decode_stream(futures::stream::iter(body), |_| {}).await?;
//! assert_eq!(text, "Hello");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod images;
pub mod observability;
pub mod prompt;
pub mod services;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{ApiConfig, ApiConfigBuilder, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use errors::{CouncilError, CouncilResult};
pub use images::{ImageUpload, IngestReport, MAX_IMAGES, MAX_IMAGE_BYTES};
pub use services::{AppState, ReportOrchestrator, ReportService};
pub use transport::DeltaStream;
pub use types::chat::{ChatChunk, ChatRequest, Content, ContentPart, Message, Role};
pub use types::context::ProductContext;

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
