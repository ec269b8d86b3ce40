//! Shared plumbing for YouTube's innertube API: watch-page fetch, API key
//! extraction and the player endpoint. Used by both the transcript and
//! metadata paths.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, Proxy};
use serde_json::{Value, json};

use crate::{error::Result, video_id::VideoId};

pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player";
const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "20.10.38";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static API_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([A-Za-z0-9_-]+)""#)
        .expect("Should be able to parse the API key regex")
});

/// Build an HTTP client with the standard timeout, optionally routed
/// through a proxy. The transcript race builds one per attempt so each
/// request can ride a fresh proxy identity.
pub fn build_client(proxy: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(Proxy::all(proxy_url)?);
    }
    Ok(builder.build()?)
}

pub fn watch_url(video_id: &VideoId) -> String {
    format!("{WATCH_URL}{video_id}")
}

pub async fn fetch_watch_page(client: &Client, video_id: &VideoId) -> Result<String> {
    let body = client
        .get(watch_url(video_id))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

pub fn extract_api_key(page: &str) -> Option<String> {
    API_KEY_REGEX
        .captures(page)
        .map(|caps| caps[1].to_string())
}

pub async fn player_response(
    client: &Client,
    api_key: &str,
    video_id: &VideoId,
) -> Result<Value> {
    let body = json!({
        "context": {
            "client": {
                "clientName": CLIENT_NAME,
                "clientVersion": CLIENT_VERSION,
            }
        },
        "videoId": video_id.as_str(),
    });
    let data = client
        .post(format!("{PLAYER_URL}?key={api_key}"))
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    Ok(data)
}
