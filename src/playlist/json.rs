use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::ParsedPlaylist;
use crate::channels::{Channel, DEFAULT_CATEGORY};
use crate::progress::{Phase, ProgressSink, Throttle};
use crate::stream_url;

#[derive(Debug, Deserialize)]
struct JsonChannel {
    name: String,
    url: String,
    #[serde(default, alias = "group")]
    category: Option<String>,
    #[serde(default)]
    tvg_id: Option<String>,
    #[serde(default)]
    tvg_name: Option<String>,
    #[serde(default)]
    tvg_logo: Option<String>,
}

/// Accepts `{"channels": [...]}` or a bare array. Records that do not match
/// the expected shape are counted as malformed.
pub fn parse(text: &str, sink: &dyn ProgressSink) -> Result<ParsedPlaylist, String> {
    let document: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let records = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("channels") {
            Some(Value::Array(items)) => items,
            _ => return Err("JSON object has no \"channels\" array".to_string()),
        },
        _ => return Err("JSON document is neither an array nor an object".to_string()),
    };

    let total = records.len();
    let mut throttle = Throttle::new(Phase::Parse, total);
    let mut out = ParsedPlaylist::default();

    for (index, record) in records.into_iter().enumerate() {
        let before = out.channels.len();
        match serde_json::from_value::<JsonChannel>(record) {
            Ok(item) => match stream_url::normalize(&item.url) {
                Some(url) => {
                    let category = item
                        .category
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
                    let mut channel = Channel::new(item.name.trim(), url, category);
                    channel.tvg_id = item.tvg_id;
                    channel.tvg_name = item.tvg_name;
                    channel.tvg_logo = item.tvg_logo;
                    channel.refresh_resolution();
                    out.push(channel);
                }
                None => out.malformed += 1,
            },
            Err(e) => {
                debug!("skipping JSON record {}: {}", index, e);
                out.malformed += 1;
            }
        }

        let latest = if out.channels.len() > before {
            out.channels.last()
        } else {
            None
        };
        throttle.tick(
            sink,
            index + 1,
            || format!("parsed {} of {} records", index + 1, total),
            latest,
        );
    }

    throttle.tick(sink, total, || "parse complete".to_string(), None);
    Ok(out)
}
