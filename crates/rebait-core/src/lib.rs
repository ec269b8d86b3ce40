//! Rebait Core Library
//!
//! Core functionality for fetching YouTube transcripts and metadata,
//! assembling an AI prompt, and generating de-clickbaited titles, with
//! every stage cached on disk per video.

pub mod cache;
pub mod config;
pub mod error;
pub mod innertube;
pub mod llm;
pub mod metadata;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod transcript;
pub mod types;
pub mod video_id;

// Re-export commonly used items at crate root
pub use cache::{CacheStore, Stage};
pub use config::{Config, ProxyConfig};
pub use error::{RebaitError, Result};
pub use llm::LlmService;
pub use metadata::{MetadataFetcher, MetadataSource};
pub use pipeline::{Pipeline, PipelineOptions};
pub use prompt::{assemble_prompt, flatten_transcript};
pub use provider::{Provider, ProviderConfig};
pub use transcript::TranscriptFetcher;
pub use types::{Metadata, PipelineResult, TranscriptSegment};
pub use video_id::VideoId;
