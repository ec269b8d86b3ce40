//! Transcript flattening and prompt assembly. Pure string work.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Metadata, TranscriptSegment};

/// Caption speaker marker: optional leading whitespace, `>>`, more whitespace.
static MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*>>\s*").expect("Should be able to parse the marker regex")
});

/// Join an ordered segment sequence into one newline-separated text.
///
/// Segments carrying a `>>` speaker marker get the marker stripped, other
/// non-blank segments pass through verbatim, blank segments are dropped.
/// Idempotent and order-preserving.
pub fn flatten_transcript(segments: &[TranscriptSegment]) -> String {
    let mut lines = Vec::with_capacity(segments.len());
    for segment in segments {
        if MARKER_REGEX.is_match(&segment.text) {
            lines.push(MARKER_REGEX.replace(&segment.text, "").into_owned());
        } else if !segment.text.trim().is_empty() {
            lines.push(segment.text.clone());
        }
    }
    lines.join("\n")
}

/// Render the final prompt: template, then metadata, then subtitles, in a
/// fixed line layout.
pub fn assemble_prompt(template: &str, metadata: &Metadata, flattened: &str) -> String {
    let title = if metadata.title.is_empty() {
        "Unknown"
    } else {
        metadata.title.as_str()
    };

    let lines = [
        template.to_string(),
        String::new(),
        format!("Title: {title}"),
        format!("Channel: {}", metadata.channel_name),
        "Description:".to_string(),
        metadata.description.clone(),
        String::new(),
        "Subtitles:".to_string(),
        flattened.to_string(),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            start,
            duration: 1.0,
        }
    }

    #[test]
    fn strips_speaker_markers_regardless_of_whitespace() {
        let segments = vec![seg("   >>  Hello", 0.0), seg(">>world", 1.0)];
        assert_eq!(flatten_transcript(&segments), "Hello\nworld");
    }

    #[test]
    fn keeps_plain_segments_and_drops_blank_ones() {
        let segments = vec![
            seg("first line", 0.0),
            seg("   ", 1.0),
            seg("", 2.0),
            seg("second line", 3.0),
        ];
        assert_eq!(flatten_transcript(&segments), "first line\nsecond line");
    }

    #[test]
    fn flattening_is_idempotent() {
        let segments = vec![seg(">> Hello", 0.0), seg("world", 1.0)];
        let once = flatten_transcript(&segments);
        let relattened: Vec<TranscriptSegment> = once
            .lines()
            .enumerate()
            .map(|(i, line)| seg(line, i as f64))
            .collect();
        assert_eq!(flatten_transcript(&relattened), once);
    }

    #[test]
    fn prompt_layout_is_exact() {
        let metadata = Metadata {
            title: "T".to_string(),
            channel_name: "C".to_string(),
            description: "D".to_string(),
            ..Metadata::default()
        };
        let prompt = assemble_prompt("Rewrite the title.", &metadata, "Hello\nworld");
        assert_eq!(
            prompt,
            "Rewrite the title.\n\nTitle: T\nChannel: C\nDescription:\nD\n\nSubtitles:\nHello\nworld"
        );
    }

    #[test]
    fn missing_title_renders_as_unknown() {
        let prompt = assemble_prompt("tpl", &Metadata::default(), "");
        assert!(prompt.contains("Title: Unknown"));
    }
}
