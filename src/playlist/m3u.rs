use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::ParsedPlaylist;
use crate::channels::{Channel, DEFAULT_CATEGORY};
use crate::progress::{Phase, ProgressSink, Throttle};
use crate::stream_url;

lazy_static! {
    static ref ATTRIBUTE: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtInf {
    pub duration: String,
    pub attributes: Vec<(String, String)>,
    pub name: String,
}

impl ExtInf {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `#EXTINF:<duration>[ attrs],<name>`. The display name starts after
/// the first comma outside a quoted attribute value.
pub fn parse_extinf(line: &str) -> Option<ExtInf> {
    let body = line.strip_prefix("#EXTINF:")?;

    let mut in_quotes = false;
    let mut split_at = None;
    for (i, ch) in body.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    let (head, name) = match split_at {
        Some(i) => (&body[..i], body[i + 1..].trim()),
        None => (body, ""),
    };

    let head = head.trim();
    let (duration, attrs) = match head.find(char::is_whitespace) {
        Some(i) => (&head[..i], &head[i..]),
        None => (head, ""),
    };

    let attributes = ATTRIBUTE
        .captures_iter(attrs)
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .collect();

    Some(ExtInf {
        duration: duration.to_string(),
        attributes,
        name: name.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn build_channel(info: ExtInf, url: String, group_hint: Option<&str>) -> Channel {
    let category = non_empty(info.attribute("group-title"))
        .or_else(|| non_empty(group_hint))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let tvg_name = non_empty(info.attribute("tvg-name"));
    let name = if !info.name.is_empty() {
        info.name.clone()
    } else {
        tvg_name.clone().unwrap_or_else(|| url.clone())
    };

    let mut channel = Channel::new(name, url, category);
    channel.tvg_id = non_empty(info.attribute("tvg-id"));
    channel.tvg_name = tvg_name;
    channel.tvg_logo = non_empty(info.attribute("tvg-logo"));
    channel.extra_attributes = info
        .attributes
        .into_iter()
        .filter(|(k, _)| {
            !["group-title", "tvg-id", "tvg-name", "tvg-logo"]
                .iter()
                .any(|known| k.eq_ignore_ascii_case(known))
        })
        .collect();
    channel.refresh_resolution();
    channel
}

pub fn parse(text: &str, sink: &dyn ProgressSink) -> ParsedPlaylist {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let mut throttle = Throttle::new(Phase::Parse, total);
    let mut out = ParsedPlaylist::default();

    let mut pending: Option<ExtInf> = None;
    let mut group_hint: Option<String> = None;

    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        let mut parsed_channel = None;

        if line.is_empty() || line.starts_with("#EXTM3U") {
            // nothing
        } else if line.starts_with("#EXTINF:") {
            if pending.is_some() {
                debug!("EXTINF without URL before line {}, discarding it", index + 1);
                out.malformed += 1;
            }
            pending = parse_extinf(line);
        } else if let Some(group) = line.strip_prefix("#EXTGRP:") {
            group_hint = Some(group.trim().to_string());
        } else if line.starts_with('#') {
            // other directives (#EXTVLCOPT, #KODIPROP, ...) are ignored
        } else {
            let candidate = line.trim_end_matches('`');
            match (pending.take(), stream_url::normalize(candidate)) {
                (Some(info), Some(url)) => {
                    let channel = build_channel(info, url, group_hint.take().as_deref());
                    out.push(channel);
                    parsed_channel = out.channels.last();
                }
                (Some(_), None) => {
                    debug!("empty URL on line {}", index + 1);
                    out.malformed += 1;
                }
                (None, _) => {
                    debug!("URL without EXTINF on line {}: {}", index + 1, line);
                    out.malformed += 1;
                }
            }
        }

        throttle.tick(
            sink,
            index + 1,
            || format!("parsed {} of {} lines", index + 1, total),
            parsed_channel,
        );
    }

    if pending.is_some() {
        out.malformed += 1;
    }
    throttle.tick(sink, total, || "parse complete".to_string(), None);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;

    #[test]
    fn test_parse_m3u() {
        let data = r#"#EXTM3U
#EXTINF:0,3sat SD
#EXTVLCOPT:network-caching=1000
rtsp://192.168.178.1:554/?avm=1&freq=450&bw=8&msys=dvbc&mtype=256qam&sr=6900&specinv=1&pids=0,16,17,18,20,200,210,220,221,222,231,250
#EXTINF:0,KiKA SD
#EXTVLCOPT:network-caching=1000
rtsp://192.168.178.1:554/?avm=1&freq=450&bw=8&msys=dvbc&mtype=256qam&sr=6900&specinv=1&pids=0,16,17,18,20,300,310,320,321,322,331"#;

        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.channels.len(), 2);
        assert_eq!(parsed.channels[0].name, "3sat SD");
        assert!(parsed.channels[0].url.starts_with("rtsp://"));
        assert_eq!(parsed.channels[0].category, DEFAULT_CATEGORY);
        assert_eq!(parsed.channels[0].resolution_from_name.as_deref(), Some("SD"));
        assert_eq!(parsed.channels[1].name, "KiKA SD");
        assert_eq!(parsed.malformed, 0);
    }

    #[test]
    fn test_attributes() {
        let data = "#EXTM3U\n#EXTINF:-1 group-title=\"News\" tvg-id=\"c1\",Channel 1\nhttp://x/1\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.channels.len(), 1);
        let ch = &parsed.channels[0];
        assert_eq!(ch.category, "News");
        assert_eq!(ch.tvg_id.as_deref(), Some("c1"));
        assert_eq!(ch.name, "Channel 1");
        assert_eq!(parsed.categories, vec!["News".to_string()]);
    }

    #[test]
    fn test_extinf_with_comma_inside_attribute() {
        let info = parse_extinf(
            r#"#EXTINF:-1 tvg-name="A, B" tvg-logo="http://l/a.png" catchup="default",A B HD"#,
        )
        .unwrap();
        assert_eq!(info.duration, "-1");
        assert_eq!(info.attribute("tvg-name"), Some("A, B"));
        assert_eq!(info.attribute("catchup"), Some("default"));
        assert_eq!(info.name, "A B HD");
    }

    #[test]
    fn test_dangling_extinf_is_discarded() {
        let data = "#EXTM3U\n#EXTINF:-1,Lost\n#EXTINF:-1,Found\nhttp://x/found\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].name, "Found");
        assert_eq!(parsed.malformed, 1);
    }

    #[test]
    fn test_backtick_tag_and_extgrp() {
        let data = "#EXTM3U\n#EXTGRP:Sports\n#EXTINF:-1 tvg-name=\"ESPN\",\nhttp://x/espn$dev1`\n";
        let parsed = parse(data, &NullSink);
        let ch = &parsed.channels[0];
        assert_eq!(ch.url, "http://x/espn");
        assert_eq!(ch.category, "Sports");
        assert_eq!(ch.name, "ESPN");
    }

    #[test]
    fn test_extra_attributes_are_kept() {
        let data = "#EXTINF:-1 tvg-id=\"a\" catchup=\"shift\" catchup-days=\"7\",A\nhttp://x/a\n";
        let parsed = parse(data, &NullSink);
        assert_eq!(
            parsed.channels[0].extra_attributes,
            vec![
                ("catchup".to_string(), "shift".to_string()),
                ("catchup-days".to_string(), "7".to_string())
            ]
        );
    }
}
