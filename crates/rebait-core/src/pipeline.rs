//! Pipeline orchestration: acquire transcript and metadata concurrently,
//! flatten, assemble the prompt, ask the LLM, and report per-step timing.

use std::time::Instant;

use tracing::{debug, info};

use crate::{
    cache::{CacheStore, Stage},
    config::Config,
    error::Result,
    llm::LlmService,
    metadata::MetadataFetcher,
    prompt::{assemble_prompt, flatten_transcript},
    transcript::TranscriptFetcher,
    types::{Metadata, PipelineResult, TranscriptSegment},
    video_id::VideoId,
};

pub struct PipelineOptions {
    /// Bypass every cache read for this run.
    pub force: bool,
    /// Skip acquisition when the transcript, metadata and flattened caches
    /// are all present; falls back to the full path when any is missing.
    pub ai_only: bool,
    /// Prompt template text, supplied by the caller.
    pub template: String,
}

pub struct Pipeline {
    cache: CacheStore,
    transcripts: TranscriptFetcher,
    metadata: MetadataFetcher,
    llm: LlmService,
}

impl Pipeline {
    /// Wires the stages together. Provider credentials are validated here,
    /// before any network traffic.
    pub fn new(cache: CacheStore, config: &Config) -> Result<Self> {
        let transcripts = TranscriptFetcher::new(cache.clone(), config.proxy.clone());
        let metadata = MetadataFetcher::new(cache.clone())?;
        let llm = LlmService::new(cache.clone(), config)?;
        Ok(Self {
            cache,
            transcripts,
            metadata,
            llm,
        })
    }

    pub async fn run(&self, video_id: &VideoId, opts: &PipelineOptions) -> Result<PipelineResult> {
        let total_start = Instant::now();

        let cached_inputs = if opts.ai_only && !opts.force {
            let inputs = self.read_cached_inputs(video_id).await;
            if inputs.is_none() {
                info!(video_id = %video_id, "ai-only requested but caches incomplete, running full path");
            }
            inputs
        } else {
            None
        };

        let (metadata, flattened, transcript_elapsed, metadata_elapsed) = match cached_inputs {
            Some((metadata, flattened)) => {
                debug!(video_id = %video_id, "ai-only shortcut, acquisition skipped");
                (metadata, flattened, 0.0, 0.0)
            }
            None => {
                let (segments, metadata, transcript_elapsed, metadata_elapsed) =
                    self.acquire(video_id, opts.force).await?;
                let flattened = flatten_transcript(&segments);
                self.cache
                    .write_text(video_id, Stage::Flattened, &flattened)
                    .await?;
                (metadata, flattened, transcript_elapsed, metadata_elapsed)
            }
        };

        let prompt = assemble_prompt(&opts.template, &metadata, &flattened);
        self.cache
            .write_text(video_id, Stage::FinalPrompt, &prompt)
            .await?;

        let llm_start = Instant::now();
        let title = self.llm.respond(video_id, &prompt, opts.force).await?;
        let llm_elapsed = llm_start.elapsed().as_secs_f64();

        Ok(PipelineResult {
            transcript_elapsed: round2(transcript_elapsed),
            metadata_elapsed: round2(metadata_elapsed),
            llm_elapsed: round2(llm_elapsed),
            total_elapsed: round2(total_start.elapsed().as_secs_f64()),
            video_duration: metadata.duration.clone(),
            title: title.trim().to_string(),
        })
    }

    /// Transcript and metadata run concurrently; both must land before
    /// prompt assembly. Each side is timed independently.
    async fn acquire(
        &self,
        video_id: &VideoId,
        force: bool,
    ) -> Result<(Vec<TranscriptSegment>, Metadata, f64, f64)> {
        let transcript_task = async {
            let start = Instant::now();
            let result = self.transcripts.fetch(video_id, force).await;
            (result, start.elapsed().as_secs_f64())
        };
        let metadata_task = async {
            let start = Instant::now();
            let result = self.metadata.fetch(video_id, force).await;
            (result, start.elapsed().as_secs_f64())
        };

        let ((segments, transcript_elapsed), (metadata, metadata_elapsed)) =
            tokio::join!(transcript_task, metadata_task);
        Ok((segments?, metadata?, transcript_elapsed, metadata_elapsed))
    }

    /// All three acquisition caches must be present for the shortcut; the
    /// transcript itself is only checked, the flattened text is what the
    /// prompt consumes.
    async fn read_cached_inputs(&self, video_id: &VideoId) -> Option<(Metadata, String)> {
        self.cache.read_transcript(video_id).await?;
        let metadata = self.cache.read_metadata(video_id).await?;
        let flattened = self.cache.read_text(video_id, Stage::Flattened).await?;
        Some((metadata, flattened))
    }
}

fn round2(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
