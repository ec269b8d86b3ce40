//! Metadata acquisition through an ordered chain of independent sources.
//!
//! Each source is tried only when the previous one errored or came back
//! without a title. Per-source failures are logged and swallowed; only
//! exhaustion of the whole chain is fatal.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    cache::CacheStore,
    error::{RebaitError, Result},
    innertube,
    types::Metadata,
    video_id::VideoId,
};

#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, video_id: &VideoId) -> Result<Metadata>;
}

pub struct MetadataFetcher {
    cache: CacheStore,
    sources: Vec<Box<dyn MetadataSource>>,
}

impl MetadataFetcher {
    pub fn new(cache: CacheStore) -> Result<Self> {
        let client = innertube::build_client(None)?;
        let sources: Vec<Box<dyn MetadataSource>> = vec![
            Box::new(InnertubeSource {
                client: client.clone(),
            }),
            Box::new(YtDlpSource),
            Box::new(OembedSource {
                client: client.clone(),
            }),
            Box::new(WatchPageSource { client }),
        ];
        Ok(Self::with_sources(cache, sources))
    }

    pub fn with_sources(cache: CacheStore, sources: Vec<Box<dyn MetadataSource>>) -> Self {
        Self { cache, sources }
    }

    pub async fn fetch(&self, video_id: &VideoId, force: bool) -> Result<Metadata> {
        if !force {
            if let Some(cached) = self.cache.read_metadata(video_id).await {
                debug!(video_id = %video_id, "metadata cache hit");
                return Ok(cached);
            }
        }

        let mut last_error = "no metadata source succeeded".to_string();
        for source in &self.sources {
            match source.fetch(video_id).await {
                Ok(metadata) if !metadata.is_empty() => {
                    debug!(source = source.name(), "metadata source succeeded");
                    self.cache.write_metadata(video_id, &metadata).await?;
                    return Ok(metadata);
                }
                Ok(_) => {
                    warn!(source = source.name(), "metadata source returned an empty record");
                    last_error = format!("{} returned no usable fields", source.name());
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "metadata source failed");
                    last_error = err.to_string();
                }
            }
        }

        Err(RebaitError::AllMetadataMethodsFailed {
            video_id: video_id.to_string(),
            last_error,
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn from_video_details(details: &Value) -> Metadata {
    Metadata {
        title: str_field(details, "title"),
        duration: str_field(details, "lengthSeconds"),
        description: str_field(details, "shortDescription"),
        channel_name: str_field(details, "author"),
        channel_id: str_field(details, "channelId"),
        keywords: str_list(details, "keywords"),
    }
}

/// Primary source: innertube player endpoint, keyed with a token scraped
/// off the public watch page.
struct InnertubeSource {
    client: Client,
}

#[async_trait]
impl MetadataSource for InnertubeSource {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn fetch(&self, video_id: &VideoId) -> Result<Metadata> {
        let page = innertube::fetch_watch_page(&self.client, video_id).await?;
        let api_key =
            innertube::extract_api_key(&page).ok_or_else(|| RebaitError::ExtractionFailed {
                reason: "could not locate innertube API key on watch page".to_string(),
            })?;
        let player = innertube::player_response(&self.client, &api_key, video_id).await?;
        let details = player.get("videoDetails").cloned().unwrap_or(Value::Null);
        Ok(from_video_details(&details))
    }
}

/// Secondary source: the yt-dlp info dump, when the binary is installed.
struct YtDlpSource;

#[async_trait]
impl MetadataSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, video_id: &VideoId) -> Result<Metadata> {
        let output = Command::new("yt-dlp")
            .arg("-J")
            .arg("--no-download")
            .arg(innertube::watch_url(video_id))
            .output()
            .await?;

        if !output.status.success() {
            return Err(RebaitError::ExtractionFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let info: Value = serde_json::from_slice(&output.stdout)?;
        Ok(Metadata {
            title: str_field(&info, "title"),
            description: str_field(&info, "description"),
            channel_name: if info.get("channel").and_then(Value::as_str).is_some() {
                str_field(&info, "channel")
            } else {
                str_field(&info, "uploader")
            },
            channel_id: str_field(&info, "channel_id"),
            duration: info
                .get("duration")
                .and_then(Value::as_f64)
                .map(|seconds| format!("{}", seconds as u64))
                .unwrap_or_default(),
            keywords: str_list(&info, "tags"),
        })
    }
}

/// Third source: the oEmbed endpoint. Coarse but nearly always up; only
/// title and channel name are available.
struct OembedSource {
    client: Client,
}

#[async_trait]
impl MetadataSource for OembedSource {
    fn name(&self) -> &'static str {
        "oembed"
    }

    async fn fetch(&self, video_id: &VideoId) -> Result<Metadata> {
        let url = format!(
            "https://www.youtube.com/oembed?url={}&format=json",
            innertube::watch_url(video_id)
        );
        let info: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Metadata {
            title: str_field(&info, "title"),
            channel_name: str_field(&info, "author_name"),
            ..Metadata::default()
        })
    }
}

static JSON_LD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script type="application/ld\+json"[^>]*>(.*?)</script>"#)
        .expect("Should be able to parse the JSON-LD regex")
});
static OG_TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta (?:property|name)="og:title" content="([^"]*)""#)
        .expect("Should be able to parse the og:title regex")
});
static OG_DESCRIPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta (?:property|name)="og:description" content="([^"]*)""#)
        .expect("Should be able to parse the og:description regex")
});
static TITLE_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<title>(.*?)(?: - YouTube)?</title>")
        .expect("Should be able to parse the title tag regex")
});

/// Last resort: scrape the watch page itself, in layers from most to
/// least structured. Each layer runs only while no title has been found.
struct WatchPageSource {
    client: Client,
}

#[async_trait]
impl MetadataSource for WatchPageSource {
    fn name(&self) -> &'static str {
        "watch-page"
    }

    async fn fetch(&self, video_id: &VideoId) -> Result<Metadata> {
        let page = innertube::fetch_watch_page(&self.client, video_id).await?;
        Ok(scrape_watch_page(&page))
    }
}

fn scrape_watch_page(page: &str) -> Metadata {
    let mut metadata = from_json_ld(page).unwrap_or_default();

    if metadata.is_empty() {
        if let Some(caps) = OG_TITLE_REGEX.captures(page) {
            metadata.title = caps[1].to_string();
        }
        if let Some(caps) = OG_DESCRIPTION_REGEX.captures(page) {
            metadata.description = caps[1].to_string();
        }
    }

    if metadata.is_empty() {
        if let Some(details) = embedded_player_response(page) {
            metadata = from_video_details(&details);
        }
    }

    if metadata.is_empty() {
        if let Some(caps) = TITLE_TAG_REGEX.captures(page) {
            metadata.title = caps[1].trim().to_string();
        }
    }

    metadata
}

fn from_json_ld(page: &str) -> Option<Metadata> {
    let caps = JSON_LD_REGEX.captures(page)?;
    let block: Value = serde_json::from_str(caps[1].trim()).ok()?;
    let channel_name = block
        .pointer("/author/name")
        .and_then(Value::as_str)
        .or_else(|| block.get("author").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    Some(Metadata {
        title: str_field(&block, "name"),
        description: str_field(&block, "description"),
        channel_name,
        ..Metadata::default()
    })
}

/// Pull the `ytInitialPlayerResponse` object out of the page by balancing
/// braces from its first `{`. A plain non-greedy regex cuts the object
/// short on nested braces.
fn embedded_player_response(page: &str) -> Option<Value> {
    let marker = "ytInitialPlayerResponse = ";
    let start = page.find(marker)? + marker.len();
    let rest = &page[start..];
    let json = balanced_json_object(rest)?;
    let parsed: Value = serde_json::from_str(json).ok()?;
    parsed.get("videoDetails").cloned()
}

fn balanced_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ if depth == 0 => return None,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl MetadataSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn fetch(&self, _video_id: &VideoId) -> Result<Metadata> {
            Err(RebaitError::ExtractionFailed {
                reason: "always down".to_string(),
            })
        }
    }

    struct EmptySource;

    #[async_trait]
    impl MetadataSource for EmptySource {
        fn name(&self) -> &'static str {
            "empty"
        }
        async fn fetch(&self, _video_id: &VideoId) -> Result<Metadata> {
            Ok(Metadata::default())
        }
    }

    struct FixedSource(Metadata);

    #[async_trait]
    impl MetadataSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn fetch(&self, _video_id: &VideoId) -> Result<Metadata> {
            Ok(self.0.clone())
        }
    }

    fn vid() -> VideoId {
        VideoId::resolve("dQw4w9WgXcQ").unwrap()
    }

    fn titled(title: &str) -> Metadata {
        Metadata {
            title: title.to_string(),
            ..Metadata::default()
        }
    }

    #[tokio::test]
    async fn chain_falls_through_to_the_first_usable_source() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MetadataFetcher::with_sources(
            CacheStore::new(dir.path()),
            vec![
                Box::new(FailingSource),
                Box::new(EmptySource),
                Box::new(FixedSource(titled("from the third"))),
            ],
        );
        let metadata = fetcher.fetch(&vid(), false).await.unwrap();
        assert_eq!(metadata.title, "from the third");
    }

    #[tokio::test]
    async fn chain_exhaustion_carries_the_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MetadataFetcher::with_sources(
            CacheStore::new(dir.path()),
            vec![Box::new(FailingSource), Box::new(EmptySource)],
        );
        let err = fetcher.fetch(&vid(), false).await.unwrap_err();
        match err {
            RebaitError::AllMetadataMethodsFailed { last_error, .. } => {
                assert!(last_error.contains("empty"), "last_error: {last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn successful_fetch_is_cached_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let fetcher = MetadataFetcher::with_sources(
            cache.clone(),
            vec![Box::new(FixedSource(titled("cached title")))],
        );
        fetcher.fetch(&vid(), false).await.unwrap();

        // A fetcher whose only source fails must now succeed from cache.
        let broken = MetadataFetcher::with_sources(cache, vec![Box::new(FailingSource)]);
        let metadata = broken.fetch(&vid(), false).await.unwrap();
        assert_eq!(metadata.title, "cached title");
        assert!(broken.fetch(&vid(), true).await.is_err());
    }

    #[test]
    fn scrape_prefers_json_ld() {
        let page = r#"
            <script type="application/ld+json">
            {"name": "LD Title", "description": "LD desc", "author": {"name": "LD Channel"}}
            </script>
            <meta property="og:title" content="OG Title">
        "#;
        let metadata = scrape_watch_page(page);
        assert_eq!(metadata.title, "LD Title");
        assert_eq!(metadata.channel_name, "LD Channel");
    }

    #[test]
    fn scrape_falls_back_through_layers() {
        let og_only = r#"<meta property="og:title" content="OG Title">
            <meta property="og:description" content="OG desc">"#;
        let metadata = scrape_watch_page(og_only);
        assert_eq!(metadata.title, "OG Title");
        assert_eq!(metadata.description, "OG desc");

        let state_only = r#"<script>var ytInitialPlayerResponse = {"videoDetails":
            {"title": "State Title", "author": "State Channel", "lengthSeconds": "99"}};</script>"#;
        let metadata = scrape_watch_page(state_only);
        assert_eq!(metadata.title, "State Title");
        assert_eq!(metadata.duration, "99");

        let title_only = "<html><title>Bare Title - YouTube</title></html>";
        assert_eq!(scrape_watch_page(title_only).title, "Bare Title");

        assert!(scrape_watch_page("<html></html>").is_empty());
    }

    #[test]
    fn balanced_object_survives_nested_braces_and_strings() {
        let text = r#"{"a": {"b": "}"}, "c": 1}; var x = 2;"#;
        assert_eq!(
            balanced_json_object(text),
            Some(r#"{"a": {"b": "}"}, "c": 1}"#)
        );
        assert!(balanced_json_object("no object here").is_none());
    }
}
