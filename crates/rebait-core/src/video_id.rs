use std::fmt;

use url::Url;

use crate::error::{RebaitError, Result};

/// Canonical 11-character YouTube video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    /// Resolve a bare ID or any of the supported YouTube URL shapes.
    ///
    /// Accepts `watch?v=`, `/embed/`, `/shorts/`, `/v/` and `youtu.be`
    /// forms. Pure string work, no network.
    pub fn resolve(input: &str) -> Result<VideoId> {
        let trimmed = input.trim();
        if is_canonical(trimmed) {
            return Ok(VideoId(trimmed.to_string()));
        }
        extract_from_url(trimmed).ok_or_else(|| RebaitError::IdentifierNotFound {
            input: input.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_canonical(value: &str) -> bool {
    value.len() == 11
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn extract_from_url(raw: &str) -> Option<VideoId> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;

    let candidate = match host {
        "youtube.com" | "www.youtube.com" => {
            if parsed.path() == "/watch" {
                parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned())
            } else {
                ["/embed/", "/shorts/", "/v/"].iter().find_map(|prefix| {
                    let rest = parsed.path().strip_prefix(prefix)?;
                    let end = rest
                        .find(['/', '?', '#', '&'])
                        .unwrap_or(rest.len());
                    Some(rest[..end].to_string())
                })
            }
        }
        "youtu.be" => Some(parsed.path().trim_start_matches('/').to_string()),
        _ => None,
    }?;

    is_canonical(&candidate).then(|| VideoId(candidate))
}
