//! Playlist input: decoding, dialect detection and the three dialect parsers.
//!
//! Every parser yields a [`ParsedPlaylist`]: channels in file order plus the
//! categories in first-appearance order. Record-level problems never fail a
//! parse, they are only counted.

pub mod json;
pub mod m3u;
pub mod txt;

use std::path::Path;

use encoding_rs::{GB18030, UTF_8};
use serde::Serialize;
use tracing::{info, warn};

use crate::channels::{Channel, ChannelStore};
use crate::error::ValidatorError;
use crate::progress::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    M3u,
    Txt,
    Json,
}

impl Dialect {
    pub fn from_extension(path: &Path) -> Option<Dialect> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "m3u" | "m3u8" => Some(Dialect::M3u),
            "json" => Some(Dialect::Json),
            "txt" => Some(Dialect::Txt),
            _ => None,
        }
    }

    /// Content sniffing for files whose extension says nothing.
    pub fn sniff(text: &str) -> Option<Dialect> {
        let head = text.trim_start();
        if is_m3u_header(head) {
            return Some(Dialect::M3u);
        }
        if head.starts_with('{') || head.starts_with('[') {
            return Some(Dialect::Json);
        }
        let looks_like_txt = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("//"))
            .any(|l| l.contains(','));
        looks_like_txt.then_some(Dialect::Txt)
    }

    /// `.m3u`/`.m3u8`/`.json` are taken at their word. Everything else,
    /// `.txt` included, is TXT unless the body is clearly M3U or JSON.
    pub fn detect(path: &Path, text: &str) -> Option<Dialect> {
        match Dialect::from_extension(path) {
            Some(Dialect::Txt) => Some(Dialect::sniff_structured(text).unwrap_or(Dialect::Txt)),
            Some(dialect) => Some(dialect),
            None => Dialect::sniff(text),
        }
    }

    fn sniff_structured(text: &str) -> Option<Dialect> {
        let head = text.trim_start();
        if is_m3u_header(head) {
            return Some(Dialect::M3u);
        }
        let bracketed = head.starts_with('{') || head.starts_with('[');
        if bracketed && serde_json::from_str::<serde_json::Value>(head).is_ok() {
            return Some(Dialect::Json);
        }
        None
    }
}

fn is_m3u_header(head: &str) -> bool {
    head.starts_with("#EXTM3U") || head.starts_with("#EXTINF")
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
    /// Replacement characters were substituted somewhere.
    pub lossy: bool,
}

/// UTF-8 (BOM stripped), then GB18030, then lossy UTF-8. Never fails.
pub fn decode(bytes: &[u8]) -> Decoded {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return Decoded {
            text: text.to_string(),
            encoding: UTF_8.name(),
            lossy: false,
        };
    }
    if let Some(text) = GB18030.decode_without_bom_handling_and_without_replacement(body) {
        return Decoded {
            text: text.into_owned(),
            encoding: GB18030.name(),
            lossy: false,
        };
    }
    let (text, _) = UTF_8.decode_without_bom_handling(body);
    Decoded {
        text: text.into_owned(),
        encoding: UTF_8.name(),
        lossy: true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    pub categories: Vec<String>,
    pub malformed: usize,
}

impl ParsedPlaylist {
    pub(crate) fn declare(&mut self, category: &str) {
        if !self.categories.iter().any(|c| c == category) {
            self.categories.push(category.to_string());
        }
    }

    pub(crate) fn push(&mut self, channel: Channel) {
        self.declare(&channel.category);
        self.channels.push(channel);
    }

    pub fn into_store(self) -> ChannelStore {
        let mut store = ChannelStore::new();
        for category in &self.categories {
            store.declare_category(category);
        }
        store.extend(self.channels);
        store
    }
}

/// Parses already-decoded text in the given dialect. Only JSON can fail,
/// when the document is not JSON or carries no channel list.
pub fn parse(text: &str, dialect: Dialect, sink: &dyn ProgressSink) -> Result<ParsedPlaylist, String> {
    match dialect {
        Dialect::M3u => Ok(m3u::parse(text, sink)),
        Dialect::Txt => Ok(txt::parse(text, sink)),
        Dialect::Json => json::parse(text, sink),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadInfo {
    pub dialect: Dialect,
    pub encoding: &'static str,
    pub lossy: bool,
    pub malformed: usize,
}

/// Reads, decodes and parses `path` into a fresh store.
pub fn load(path: &Path, sink: &dyn ProgressSink) -> Result<(ChannelStore, LoadInfo), ValidatorError> {
    let bytes = std::fs::read(path).map_err(|source| ValidatorError::InputUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode(&bytes);
    if decoded.lossy {
        warn!(
            "{} is neither UTF-8 nor GB18030; decoded with replacement characters",
            path.display()
        );
    }

    let dialect = Dialect::detect(path, &decoded.text).ok_or_else(|| ValidatorError::UnknownDialect {
        path: path.to_path_buf(),
        reason: "no M3U header, JSON document or name,url lines found".to_string(),
    })?;

    let parsed = parse(&decoded.text, dialect, sink).map_err(|reason| ValidatorError::UnknownDialect {
        path: path.to_path_buf(),
        reason,
    })?;
    let malformed = parsed.malformed;
    let store = parsed.into_store();

    info!(
        "Parsed {} as {:?} ({}): {} channels in {} categories, {} duplicates dropped, {} malformed records",
        path.display(),
        dialect,
        decoded.encoding,
        store.len(),
        store.categories().len(),
        store.duplicates_dropped(),
        malformed
    );

    Ok((
        store,
        LoadInfo {
            dialect,
            encoding: decoded.encoding,
            lossy: decoded.lossy,
            malformed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_by_extension_then_content() {
        assert_eq!(Dialect::detect(&PathBuf::from("a.M3U8"), ""), Some(Dialect::M3u));
        assert_eq!(Dialect::detect(&PathBuf::from("a.json"), ""), Some(Dialect::Json));
        assert_eq!(Dialect::detect(&PathBuf::from("a.txt"), "#EXTM3U"), Some(Dialect::M3u));
        assert_eq!(Dialect::detect(&PathBuf::from("a.txt"), "[{\"name\":\"A\",\"url\":\"http://x\"}]"), Some(Dialect::Json));
        assert_eq!(Dialect::detect(&PathBuf::from("a.txt"), "[broken"), Some(Dialect::Txt));
        assert_eq!(Dialect::detect(&PathBuf::from("a.txt"), "A,http://x"), Some(Dialect::Txt));
        assert_eq!(Dialect::detect(&PathBuf::from("list"), "\n#EXTM3U\n"), Some(Dialect::M3u));
        assert_eq!(Dialect::detect(&PathBuf::from("list"), "  [{}]"), Some(Dialect::Json));
        assert_eq!(Dialect::detect(&PathBuf::from("list"), "A,http://x"), Some(Dialect::Txt));
        assert_eq!(Dialect::detect(&PathBuf::from("list.dat"), "garbage\nmore"), None);
    }

    #[test]
    fn test_load_m3u_body_in_txt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.txt");
        std::fs::write(&path, "#EXTM3U\n#EXTINF:-1 group-title=\"News\",Channel 1\nhttp://x/1\n").unwrap();

        let (store, info) = load(&path, &crate::progress::NullSink).unwrap();
        assert_eq!(info.dialect, Dialect::M3u);
        assert_eq!(info.malformed, 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.channels()[0].name, "Channel 1");
        assert_eq!(store.channels()[0].category, "News");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let decoded = decode("\u{feff}央视,#genre#".as_bytes());
        assert_eq!(decoded.text, "央视,#genre#");
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(!decoded.lossy);
    }

    #[test]
    fn test_decode_gb18030_fallback() {
        let (bytes, _, _) = GB18030.encode("卫视,#genre#");
        let decoded = decode(&bytes);
        assert_eq!(decoded.text, "卫视,#genre#");
        assert_eq!(decoded.encoding, "gb18030");
        assert!(!decoded.lossy);
    }

    #[test]
    fn test_decode_replacement_never_fails() {
        // 0xFF is invalid in both UTF-8 and GB18030 as a lead byte.
        let decoded = decode(b"CCTV,http://a\xFF\n");
        assert!(decoded.lossy);
        assert!(decoded.text.starts_with("CCTV,http://a"));
        assert!(decoded.text.contains('\u{FFFD}'));
    }
}
