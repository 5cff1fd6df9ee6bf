use tracing::debug;

use super::ParsedPlaylist;
use crate::channels::{Channel, DEFAULT_CATEGORY};
use crate::progress::{Phase, ProgressSink, Throttle};
use crate::stream_url;

const GENRE_MARKER: &str = "#genre#";

/// `url1#url2#url3` alternates. A `#` only separates when the next piece
/// starts a new scheme, so fragments inside one URL survive.
fn split_alternates(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, _) in value.match_indices('#') {
        let rest = &value[i + 1..];
        if rest.contains("://") && rest.split("://").next().is_some_and(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }) {
            parts.push(&value[start..i]);
            start = i + 1;
        }
    }
    parts.push(&value[start..]);
    parts
}

pub fn parse(text: &str, sink: &dyn ProgressSink) -> ParsedPlaylist {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let mut throttle = Throttle::new(Phase::Parse, total);
    let mut out = ParsedPlaylist::default();
    let mut category = DEFAULT_CATEGORY.to_string();

    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim_start_matches('\u{feff}').trim();
        let before = out.channels.len();

        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            // comment
        } else if let Some((name, value)) = line.split_once(',') {
            let name = name.trim();
            let value = value.trim();
            if value.eq_ignore_ascii_case(GENRE_MARKER) {
                category = if name.is_empty() {
                    DEFAULT_CATEGORY.to_string()
                } else {
                    name.to_string()
                };
                out.declare(&category);
            } else if name.is_empty() {
                debug!("channel without a name on line {}", index + 1);
                out.malformed += 1;
            } else {
                for candidate in split_alternates(value) {
                    match stream_url::normalize(candidate) {
                        Some(url) => out.push(Channel::new(name, url, category.as_str())),
                        None => out.malformed += 1,
                    }
                }
            }
        } else {
            debug!("line {} has no comma: {}", index + 1, line);
            out.malformed += 1;
        }

        let latest = if out.channels.len() > before {
            out.channels.last()
        } else {
            None
        };
        throttle.tick(
            sink,
            index + 1,
            || format!("parsed {} of {} lines", index + 1, total),
            latest,
        );
    }

    throttle.tick(sink, total, || "parse complete".to_string(), None);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NullSink, ProgressEvent};
    use std::sync::Mutex;

    #[test]
    fn test_genre_directives() {
        let data = "央视,#genre#\nCCTV-1,http://a/1.m3u8\nCCTV-2,http://a/2.m3u8\n卫视,#genre#\n湖南卫视,http://b/h.m3u8\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.categories, vec!["央视".to_string(), "卫视".to_string()]);
        assert_eq!(parsed.channels.len(), 3);
        assert_eq!(parsed.channels[2].category, "卫视");
        assert_eq!(parsed.malformed, 0);
    }

    #[test]
    fn test_default_category_and_comments() {
        let data = "// exported by box\n# comment\n\nCCTV-1,http://a/1\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_multiple_urls_share_a_name() {
        let data = "CCTV-1,http://a/1#http://b/1\nCCTV-1,rtmp://c/1\nPage,http://d/x.html#top\n";
        let parsed = parse(data, &NullSink);
        let urls: Vec<&str> = parsed.channels.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a/1", "http://b/1", "rtmp://c/1", "http://d/x.html#top"]);
        assert!(parsed.channels[..3].iter().all(|c| c.name == "CCTV-1"));
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let data = "no comma here\n,http://a\nEmpty,$tag\nOk,http://ok\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.malformed, 3);
    }

    #[test]
    fn test_parse_progress_reaches_100() {
        let events = Mutex::new(Vec::<ProgressEvent>::new());
        let sink = |e: ProgressEvent| events.lock().unwrap().push(e);
        parse("A,#genre#\nx,http://x\ny,http://y\n", &sink);
        let events = events.into_inner().unwrap();
        assert!(events.iter().all(|e| e.phase == Phase::Parse));
        assert_eq!(events.last().map(|e| e.progress), Some(100));
        assert!(events.iter().any(|e| e.channel.as_ref().is_some_and(|c| c.name == "y")));
    }
}
