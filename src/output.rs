use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::channels::{Channel, ChannelStore};
use crate::engine::Summary;
use crate::error::ValidatorError;
use crate::progress::{Phase, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub m3u: PathBuf,
    pub txt: PathBuf,
    pub json: PathBuf,
}

impl OutputPaths {
    pub fn for_input(input: &Path, output_dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("playlist");
        OutputPaths {
            m3u: output_dir.join(format!("{stem}_valid.m3u")),
            txt: output_dir.join(format!("{stem}_valid.txt")),
            json: output_dir.join(format!("{stem}_valid.json")),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [self.m3u.as_path(), self.txt.as_path(), self.json.as_path()]
    }
}

fn quote_attr(value: &str) -> String {
    value.replace('"', "'")
}

pub type Groups<'a> = Vec<(&'a str, Vec<&'a Channel>)>;

/// `#EXTM3U` with one EXTINF per channel; the category becomes `group-title`.
pub fn render_m3u(groups: &Groups<'_>) -> String {
    let mut out = String::from("#EXTM3U\n");
    for (category, channels) in groups {
        for channel in channels {
            let mut attrs = String::new();
            if let Some(id) = &channel.tvg_id {
                let _ = write!(attrs, " tvg-id=\"{}\"", quote_attr(id));
            }
            if let Some(name) = &channel.tvg_name {
                let _ = write!(attrs, " tvg-name=\"{}\"", quote_attr(name));
            }
            if let Some(logo) = &channel.tvg_logo {
                let _ = write!(attrs, " tvg-logo=\"{}\"", quote_attr(logo));
            }
            let _ = write!(attrs, " group-title=\"{}\"", quote_attr(category));
            for (key, value) in &channel.extra_attributes {
                let _ = write!(attrs, " {}=\"{}\"", key, quote_attr(value));
            }
            let _ = writeln!(out, "#EXTINF:-1{},{}", attrs, channel.name);
            let _ = writeln!(out, "{}", channel.url);
        }
    }
    out
}

/// `category,#genre#` headers followed by `name,url` lines.
pub fn render_txt(groups: &Groups<'_>) -> String {
    let mut out = String::new();
    for (category, channels) in groups {
        let _ = writeln!(out, "{},#genre#", category);
        for channel in channels {
            let _ = writeln!(out, "{},{}", channel.name, channel.url);
        }
    }
    out
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    total: usize,
    valid: usize,
    invalid: usize,
    filtered: usize,
    duplicates_dropped: usize,
    not_probed: usize,
    malformed_records: usize,
    cancelled: bool,
    categories: &'a [String],
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    generated_at: String,
    summary: JsonSummary<'a>,
    channels: Vec<&'a Channel>,
}

pub fn render_json(groups: &Groups<'_>, summary: &Summary, generated_at: String) -> serde_json::Result<String> {
    let document = JsonDocument {
        generated_at,
        summary: JsonSummary {
            total: summary.total,
            valid: summary.valid,
            invalid: summary.invalid,
            filtered: summary.filtered,
            duplicates_dropped: summary.duplicates_dropped,
            not_probed: summary.not_probed,
            malformed_records: summary.malformed_records,
            cancelled: summary.cancelled,
            categories: &summary.categories,
        },
        channels: groups.iter().flat_map(|(_, chans)| chans.iter().copied()).collect(),
    };
    serde_json::to_string_pretty(&document)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Writes the valid subset of `store` in all three dialects. An artifact
/// whose path would land on the input file is skipped.
pub fn write_all(
    store: &ChannelStore,
    summary: &Summary,
    input: &Path,
    output_dir: &Path,
    sink: &dyn ProgressSink,
) -> Result<OutputPaths, ValidatorError> {
    let paths = OutputPaths::for_input(input, output_dir);
    std::fs::create_dir_all(output_dir).map_err(|source| ValidatorError::OutputWrite {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let groups = store.grouped(Channel::is_valid);
    let json = render_json(&groups, summary, Local::now().to_rfc3339())
        .map_err(|e| ValidatorError::OutputWrite {
            path: paths.json.clone(),
            source: e.into(),
        })?;
    let artifacts = [
        (&paths.m3u, render_m3u(&groups)),
        (&paths.txt, render_txt(&groups)),
        (&paths.json, json),
    ];

    let total = artifacts.len();
    sink.emit(ProgressEvent::new(Phase::Write, 0, total, "writing outputs"));
    for (done, (path, content)) in artifacts.into_iter().enumerate() {
        if same_file(path, input) {
            warn!("Refusing to overwrite the input {}", path.display());
        } else {
            std::fs::write(path, content).map_err(|source| ValidatorError::OutputWrite {
                path: path.clone(),
                source,
            })?;
            info!("Wrote {}", path.display());
        }
        sink.emit(ProgressEvent::new(
            Phase::Write,
            done + 1,
            total,
            format!("wrote {}", path.display()),
        ));
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ProbeState, DEFAULT_CATEGORY};
    use crate::playlist::{m3u, txt};
    use crate::progress::NullSink;

    fn sample_store() -> ChannelStore {
        let mut store = ChannelStore::new();
        store.declare_category("央视");
        let mut c1 = Channel::new("CCTV-1", "http://a/1.m3u8", "央视");
        c1.tvg_id = Some("cctv1".to_string());
        c1.tvg_logo = Some("http://logo/1.png".to_string());
        c1.extra_attributes = vec![("catchup".to_string(), "default".to_string())];
        c1.refresh_resolution();
        store.insert(c1);
        store.insert(Channel::new("湖南卫视", "http://b/h.m3u8", "卫视"));
        store.insert(Channel::new("CCTV-2", "http://a/2.m3u8", "央视"));
        store.insert(Channel::new("Loose", "rtmp://c/loose", DEFAULT_CATEGORY));
        store
    }

    fn identity(store: &ChannelStore) -> Vec<(String, String, String, Option<String>, Option<String>)> {
        store
            .channels()
            .iter()
            .map(|c| (c.name.clone(), c.url.clone(), c.category.clone(), c.tvg_id.clone(), c.tvg_logo.clone()))
            .collect()
    }

    #[test]
    fn test_m3u_round_trip() {
        let store = sample_store();
        let text = render_m3u(&store.grouped(|_| true));
        let reparsed = m3u::parse(&text, &NullSink).into_store();

        let expected: Vec<Channel> = store
            .grouped(|_| true)
            .into_iter()
            .flat_map(|(_, channels)| channels)
            .cloned()
            .collect();
        assert_eq!(reparsed.channels(), expected.as_slice());
        assert_eq!(reparsed.categories(), ["央视", "卫视", DEFAULT_CATEGORY]);
    }

    #[test]
    fn test_txt_round_trip_in_grouped_order() {
        let mut store = ChannelStore::new();
        store.insert(Channel::new("CCTV-1", "http://a/1", "央视"));
        store.insert(Channel::new("CCTV-2", "http://a/2", "央视"));
        store.insert(Channel::new("湖南卫视", "http://b/h", "卫视"));

        let text = render_txt(&store.grouped(|_| true));
        assert_eq!(
            text,
            "央视,#genre#\nCCTV-1,http://a/1\nCCTV-2,http://a/2\n卫视,#genre#\n湖南卫视,http://b/h\n"
        );
        let reparsed = txt::parse(&text, &NullSink).into_store();
        assert_eq!(identity(&reparsed), identity(&store));
        assert_eq!(reparsed.categories(), store.categories());
    }

    #[test]
    fn test_writer_groups_and_omits_empty_categories() {
        let mut store = sample_store();
        store.settle(0, ProbeState::Ok, "ok", Some(10), Some("1080p".to_string()));
        store.settle(1, ProbeState::Fail, "http_404", None, None);
        store.settle(2, ProbeState::Ok, "ok", Some(20), None);
        store.settle(3, ProbeState::SkippedNonHttp, "non_http_not_probed", None, None);

        let groups = store.grouped(Channel::is_valid);
        let txt = render_txt(&groups);
        assert_eq!(
            txt,
            "央视,#genre#\nCCTV-1,http://a/1.m3u8\nCCTV-2,http://a/2.m3u8\n未分类,#genre#\nLoose,rtmp://c/loose\n"
        );

        let m3u = render_m3u(&groups);
        assert!(m3u.starts_with("#EXTM3U\n"));
        assert!(m3u.contains(
            "#EXTINF:-1 tvg-id=\"cctv1\" tvg-logo=\"http://logo/1.png\" group-title=\"央视\" catchup=\"default\",CCTV-1\nhttp://a/1.m3u8\n"
        ));
        assert!(!m3u.contains("湖南卫视"));
    }

    #[test]
    fn test_write_all_creates_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("channels.txt");
        std::fs::write(&input, "unused").unwrap();
        let out_dir = dir.path().join("outputs");

        let mut store = sample_store();
        store.settle(0, ProbeState::Ok, "ok", Some(10), None);
        let summary = Summary::from_store(&store, 0, 5, false);

        let paths = write_all(&store, &summary, &input, &out_dir, &NullSink).unwrap();
        assert_eq!(paths.m3u, out_dir.join("channels_valid.m3u"));
        for path in paths.all() {
            assert!(path.exists(), "{} missing", path.display());
        }
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 4);
        assert_eq!(json["summary"]["valid"], 1);
        assert_eq!(json["channels"][0]["name"], "CCTV-1");
        assert_eq!(json["channels"][0]["latency_ms"], 10);
        assert!(json["generated_at"].is_string());
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "unused");
    }
}
