use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

lazy_static! {
    static ref STREAM_RESOLUTION: Regex = Regex::new(r"RESOLUTION=(\d+)x(\d+)").unwrap();
}

const MANIFEST_CONTENT_TYPES: [&str; 3] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
];

pub fn is_manifest_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    MANIFEST_CONTENT_TYPES.contains(&essence.as_str())
}

pub fn is_manifest_body(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(body.len());
    body[start..].starts_with(b"#EXTM3U")
}

/// First media segment or variant playlist referenced by the manifest.
pub fn first_uri(manifest: &str) -> Option<&str> {
    manifest
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Largest frame height advertised by any `#EXT-X-STREAM-INF`.
pub fn max_height(manifest: &str) -> Option<u32> {
    manifest
        .lines()
        .filter(|line| line.starts_with("#EXT-X-STREAM-INF"))
        .filter_map(|line| STREAM_RESOLUTION.captures(line))
        .filter_map(|caps| caps[2].parse::<u32>().ok())
        .max()
}

pub fn resolve(base: &Url, uri: &str) -> Option<Url> {
    base.join(uri).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080,CODECS=\"avc1.640028\"
hi/index.m3u8
";

    #[test]
    fn test_content_type() {
        assert!(is_manifest_content_type("application/vnd.apple.mpegurl"));
        assert!(is_manifest_content_type("Application/X-MpegURL; charset=utf-8"));
        assert!(!is_manifest_content_type("video/mp2t"));
    }

    #[test]
    fn test_body_sniff() {
        assert!(is_manifest_body(b"\n  #EXTM3U\n#EXT-X-VERSION:3"));
        assert!(!is_manifest_body(b"\x47\x40\x00"));
    }

    #[test]
    fn test_master_playlist() {
        assert_eq!(first_uri(MASTER), Some("low/index.m3u8"));
        assert_eq!(max_height(MASTER), Some(1080));
        assert_eq!(max_height("#EXTM3U\n#EXTINF:4,\nseg1.ts\n"), None);
    }

    #[test]
    fn test_resolve_relative_segment() {
        let base = Url::parse("http://cdn.example/live/ch1/index.m3u8?token=x").unwrap();
        assert_eq!(
            resolve(&base, "seg_001.ts").unwrap().as_str(),
            "http://cdn.example/live/ch1/seg_001.ts"
        );
        assert_eq!(
            resolve(&base, "/abs/seg.ts").unwrap().as_str(),
            "http://cdn.example/abs/seg.ts"
        );
    }
}
