use serde::{Deserialize, Serialize};

/// One caption cue, in chronological order within a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Video metadata. Every source fills what it can; missing fields stay
/// empty rather than absent so downstream rendering never branches on None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Metadata {
    /// A record without a title is unusable; the fallback chain moves on.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
    }
}

/// The single record a pipeline run produces. Elapsed values are seconds.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub transcript_elapsed: f64,
    pub metadata_elapsed: f64,
    pub llm_elapsed: f64,
    pub total_elapsed: f64,
    pub video_duration: String,
    pub title: String,
}
