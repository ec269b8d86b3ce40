use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::{
    error::Result,
    types::{Metadata, TranscriptSegment},
    video_id::VideoId,
};

/// One cacheable step of the pipeline. Each stage owns a single file in
/// the per-video cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcript,
    Metadata,
    Flattened,
    FinalPrompt,
    LlmResponse,
}

impl Stage {
    pub fn file_name(self) -> &'static str {
        match self {
            Stage::Transcript => "transcript.json",
            Stage::Metadata => "metadata.json",
            Stage::Flattened => "flattened.txt",
            Stage::FinalPrompt => "final.txt",
            // Named for what it usually holds: the rewritten title.
            Stage::LlmResponse => "title.txt",
        }
    }
}

/// On-disk memoization keyed by `(video_id, stage)`.
///
/// Entries are never expired automatically; staleness is the caller's
/// business via the force flag. Anything malformed on disk reads as a
/// miss, never as an error.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, video_id: &VideoId, stage: Stage) -> PathBuf {
        self.root.join(video_id.as_str()).join(stage.file_name())
    }

    pub async fn has(&self, video_id: &VideoId, stage: Stage) -> bool {
        fs::try_exists(self.path(video_id, stage))
            .await
            .unwrap_or(false)
    }

    pub async fn read_text(&self, video_id: &VideoId, stage: Stage) -> Option<String> {
        let path = self.path(video_id, stage);
        match fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => Some(content),
            Ok(_) => {
                debug!(path = %path.display(), "cached file is empty, treating as miss");
                None
            }
            Err(_) => None,
        }
    }

    pub async fn write_text(
        &self,
        video_id: &VideoId,
        stage: Stage,
        content: &str,
    ) -> Result<()> {
        let path = self.path(video_id, stage);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await?;
        Ok(())
    }

    pub async fn read_transcript(&self, video_id: &VideoId) -> Option<Vec<TranscriptSegment>> {
        let raw = self.read_text(video_id, Stage::Transcript).await?;
        match parse_transcript(&raw) {
            Some(segments) if !segments.is_empty() => Some(segments),
            _ => {
                debug!(video_id = %video_id, "cached transcript unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn write_transcript(
        &self,
        video_id: &VideoId,
        segments: &[TranscriptSegment],
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(segments)?;
        self.write_text(video_id, Stage::Transcript, &json).await
    }

    pub async fn read_metadata(&self, video_id: &VideoId) -> Option<Metadata> {
        let raw = self.read_text(video_id, Stage::Metadata).await?;
        match parse_metadata(&raw) {
            Some(metadata) => Some(metadata),
            None => {
                debug!(video_id = %video_id, "cached metadata unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn write_metadata(&self, video_id: &VideoId, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        self.write_text(video_id, Stage::Metadata, &json).await
    }
}

/// Accepts the bare segment array or the legacy envelope object that
/// wrapped it in a `transcript_data` (or `data`) field. Bare wins.
fn parse_transcript(raw: &str) -> Option<Vec<TranscriptSegment>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let payload = match &value {
        Value::Array(_) => &value,
        Value::Object(map) => map.get("transcript_data").or_else(|| map.get("data"))?,
        _ => return None,
    };
    serde_json::from_value(payload.clone()).ok()
}

/// Accepts the bare record or the legacy `{"data": {...}}` envelope.
/// The bare interpretation is tried first.
fn parse_metadata(raw: &str) -> Option<Metadata> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if let Ok(metadata) = serde_json::from_value::<Metadata>(value.clone()) {
        if !metadata.is_empty() {
            return Some(metadata);
        }
    }
    let enveloped = value.get("data")?;
    let metadata: Metadata = serde_json::from_value(enveloped.clone()).ok()?;
    (!metadata.is_empty()).then_some(metadata)
}
