//! Transcript acquisition: cache first, then a race of redundant proxied
//! attempts, then a single direct attempt.
//!
//! The caption endpoint throttles by IP. Racing a handful of independent
//! connections (each a fresh client, optionally through a rotating proxy)
//! raises the odds that one gets through, at the price of redundant
//! request volume.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{
    cache::CacheStore,
    config::ProxyConfig,
    error::{RebaitError, Result},
    innertube,
    types::TranscriptSegment,
    video_id::VideoId,
};

const PREFERRED_LANGUAGE: &str = "en";
const RACE_STAGGER: Duration = Duration::from_millis(250);

pub struct TranscriptFetcher {
    cache: CacheStore,
    proxy: Option<ProxyConfig>,
}

impl TranscriptFetcher {
    pub fn new(cache: CacheStore, proxy: Option<ProxyConfig>) -> Self {
        Self { cache, proxy }
    }

    /// Fetch the transcript for a video, consulting the cache unless
    /// `force` is set. Exhaustion of every strategy reports
    /// `NoTranscriptAvailable`.
    pub async fn fetch(
        &self,
        video_id: &VideoId,
        force: bool,
    ) -> Result<Vec<TranscriptSegment>> {
        if !force {
            if let Some(cached) = self.cache.read_transcript(video_id).await {
                debug!(video_id = %video_id, "transcript cache hit");
                return Ok(cached);
            }
        }

        let segments = match &self.proxy {
            Some(proxy) => match self.race_proxied(video_id, proxy).await {
                Ok(segments) => segments,
                Err(err) => {
                    warn!(
                        video_id = %video_id,
                        error = %err,
                        "proxied race exhausted, falling back to direct fetch"
                    );
                    self.direct(video_id).await?
                }
            },
            None => self.direct(video_id).await?,
        };

        // Single-writer discipline: only the selected result is persisted.
        self.cache.write_transcript(video_id, &segments).await?;
        Ok(segments)
    }

    async fn race_proxied(
        &self,
        video_id: &VideoId,
        proxy: &ProxyConfig,
    ) -> Result<Vec<TranscriptSegment>> {
        let proxy_url = proxy.url.clone();
        let id = video_id.clone();
        race_first_success(proxy.attempts, RACE_STAGGER, move |attempt| {
            let proxy_url = proxy_url.clone();
            let id = id.clone();
            async move {
                debug!(video_id = %id, attempt, "starting proxied transcript attempt");
                fetch_transcript(&id, Some(&proxy_url)).await
            }
        })
        .await
    }

    async fn direct(&self, video_id: &VideoId) -> Result<Vec<TranscriptSegment>> {
        match fetch_transcript(video_id, None).await {
            Ok(segments) if !segments.is_empty() => Ok(segments),
            Ok(_) => Err(RebaitError::NoTranscriptAvailable {
                video_id: video_id.to_string(),
            }),
            Err(err) => {
                warn!(video_id = %video_id, error = %err, "direct transcript fetch failed");
                Err(RebaitError::NoTranscriptAvailable {
                    video_id: video_id.to_string(),
                })
            }
        }
    }
}

/// Launch `attempts` redundant tries, staggered so they do not hit the
/// endpoint in one burst, and settle on the first non-empty success.
/// Losers are aborted best-effort; their results are discarded either way.
pub(crate) async fn race_first_success<F, Fut>(
    attempts: usize,
    stagger: Duration,
    make_attempt: F,
) -> Result<Vec<TranscriptSegment>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<Vec<TranscriptSegment>>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for index in 0..attempts {
        let attempt = make_attempt(index);
        set.spawn(async move {
            tokio::time::sleep(stagger * index as u32).await;
            attempt.await
        });
    }

    let mut last_error: Option<RebaitError> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(segments)) if !segments.is_empty() => {
                set.abort_all();
                return Ok(segments);
            }
            Ok(Ok(_)) => {
                last_error = Some(RebaitError::ExtractionFailed {
                    reason: "attempt returned an empty transcript".to_string(),
                });
            }
            Ok(Err(err)) => {
                debug!(error = %err, "race attempt failed");
                last_error = Some(err);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                warn!(error = %join_err, "race attempt panicked");
            }
        }
    }

    Err(last_error.unwrap_or_else(|| RebaitError::ExtractionFailed {
        reason: "all race attempts failed".to_string(),
    }))
}

/// One full fetch: watch page, API key, player call, caption track for the
/// preferred language, timedtext in json3 form.
async fn fetch_transcript(
    video_id: &VideoId,
    proxy: Option<&str>,
) -> Result<Vec<TranscriptSegment>> {
    let client = innertube::build_client(proxy)?;
    let page = innertube::fetch_watch_page(&client, video_id).await?;
    let api_key =
        innertube::extract_api_key(&page).ok_or_else(|| RebaitError::ExtractionFailed {
            reason: "could not locate innertube API key on watch page".to_string(),
        })?;
    let player = innertube::player_response(&client, &api_key, video_id).await?;

    let tracks = player
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
        .and_then(Value::as_array)
        .ok_or_else(|| RebaitError::ExtractionFailed {
            reason: "player response carries no caption tracks".to_string(),
        })?;

    let track = select_track(tracks).ok_or_else(|| RebaitError::ExtractionFailed {
        reason: format!("no caption track for language {PREFERRED_LANGUAGE}"),
    })?;

    let base_url = track
        .get("baseUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| RebaitError::ExtractionFailed {
            reason: "caption track has no baseUrl".to_string(),
        })?;

    let timedtext = client
        .get(format!("{base_url}&fmt=json3"))
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;

    Ok(parse_timedtext(&timedtext))
}

fn select_track(tracks: &[Value]) -> Option<&Value> {
    let language_of = |track: &Value| {
        track
            .get("languageCode")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    tracks
        .iter()
        .find(|track| language_of(track) == PREFERRED_LANGUAGE)
        .or_else(|| {
            // Accept regional variants like en-US when plain en is absent.
            tracks
                .iter()
                .find(|track| language_of(track).starts_with(PREFERRED_LANGUAGE))
        })
}

fn parse_timedtext(value: &Value) -> Vec<TranscriptSegment> {
    let Some(events) = value.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };
    events
        .iter()
        .filter_map(|event| {
            let segs = event.get("segs")?.as_array()?;
            let text: String = segs
                .iter()
                .filter_map(|seg| seg.get("utf8").and_then(Value::as_str))
                .collect();
            if text.trim().is_empty() {
                return None;
            }
            let start = event.get("tStartMs").and_then(Value::as_f64)? / 1000.0;
            let duration = event
                .get("dDurationMs")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                / 1000.0;
            Some(TranscriptSegment {
                text,
                start,
                duration,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(text: &str) -> Vec<TranscriptSegment> {
        vec![TranscriptSegment {
            text: text.to_string(),
            start: 0.0,
            duration: 1.0,
        }]
    }

    #[tokio::test]
    async fn race_keeps_the_first_successful_attempt() {
        let result = race_first_success(3, Duration::ZERO, |attempt| async move {
            match attempt {
                0 => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(payload("slow"))
                }
                1 => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(payload("winner"))
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Err(RebaitError::ExtractionFailed {
                        reason: "boom".to_string(),
                    })
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result[0].text, "winner");
    }

    #[tokio::test]
    async fn race_skips_failures_and_empty_results() {
        let result = race_first_success(3, Duration::ZERO, |attempt| async move {
            match attempt {
                0 => Err(RebaitError::ExtractionFailed {
                    reason: "throttled".to_string(),
                }),
                1 => Ok(Vec::new()),
                _ => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(payload("late but only"))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result[0].text, "late but only");
    }

    #[tokio::test]
    async fn race_reports_the_last_error_on_exhaustion() {
        let result = race_first_success(2, Duration::ZERO, |_| async {
            Err::<Vec<TranscriptSegment>, _>(RebaitError::ExtractionFailed {
                reason: "throttled".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(RebaitError::ExtractionFailed { .. })));
    }

    #[test]
    fn timedtext_events_become_segments() {
        let value = json!({
            "events": [
                {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": ">> Hello"}]},
                {"tStartMs": 1500, "segs": [{"utf8": "wor"}, {"utf8": "ld"}]},
                {"tStartMs": 3000, "dDurationMs": 500, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 4000, "dDurationMs": 500}
            ]
        });
        let segments = parse_timedtext(&value);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, ">> Hello");
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].duration, 1.5);
        assert_eq!(segments[1].text, "world");
        assert_eq!(segments[1].duration, 0.0);
    }

    #[test]
    fn track_selection_prefers_exact_language_then_variant() {
        let tracks = vec![
            json!({"languageCode": "de", "baseUrl": "u1"}),
            json!({"languageCode": "en-US", "baseUrl": "u2"}),
            json!({"languageCode": "en", "baseUrl": "u3"}),
        ];
        assert_eq!(
            select_track(&tracks).and_then(|t| t.get("baseUrl")).and_then(Value::as_str),
            Some("u3")
        );
        let variants_only = vec![
            json!({"languageCode": "de", "baseUrl": "u1"}),
            json!({"languageCode": "en-GB", "baseUrl": "u2"}),
        ];
        assert_eq!(
            select_track(&variants_only).and_then(|t| t.get("baseUrl")).and_then(Value::as_str),
            Some("u2")
        );
        let none = vec![json!({"languageCode": "de", "baseUrl": "u1"})];
        assert!(select_track(&none).is_none());
    }
}
