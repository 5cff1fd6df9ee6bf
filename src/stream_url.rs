use lazy_static::lazy_static;
use regex::Regex;

const STREAM_SCHEMES: [&str; 7] = [
    "http://", "https://", "rtsp://", "rtmp://", "mms://", "udp://", "rtp://",
];

lazy_static! {
    static ref IPV4_WITH_PORT: Regex =
        Regex::new(r"^\d{1,3}(?:\.\d{1,3}){3}:\d{1,5}(?:/.*)?$").unwrap();
    static ref HOST_WITH_PATH: Regex = Regex::new(r"^[^\s/]+\.[^\s/]+/\S*$").unwrap();
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{[A-Z][A-Z0-9_]*\}|%7[Bb][A-Z][A-Z0-9_]*%7[Dd]").unwrap();
}

/// Trims the raw value and cuts off a trailing `$tag` (set-top-box exports
/// append device labels that way). `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let head = match trimmed.split_once('$') {
        Some((head, _)) => head.trim(),
        None => trimmed,
    };
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

pub fn is_plausible(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    if STREAM_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return true;
    }
    IPV4_WITH_PORT.is_match(url) || HOST_WITH_PATH.is_match(url)
}

/// `{UPPER_SNAKE}` templates, raw or percent-encoded, that the player fills in.
pub fn has_dynamic_placeholders(url: &str) -> bool {
    PLACEHOLDER.is_match(url)
}

pub fn is_http(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_device_tag() {
        assert_eq!(
            normalize("  http://a/1.m3u8$CCTV HD  ").as_deref(),
            Some("http://a/1.m3u8")
        );
        assert_eq!(normalize("http://a/b").as_deref(), Some("http://a/b"));
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("$only-tag"), None);
    }

    #[test]
    fn test_is_plausible() {
        assert!(is_plausible("http://example.com/live"));
        assert!(is_plausible("RTSP://192.168.178.1:554/?avm=1"));
        assert!(is_plausible("udp://@239.0.0.1:5000"));
        assert!(is_plausible("10.0.0.5:8080/stream"));
        assert!(is_plausible("10.0.0.5:8080"));
        assert!(is_plausible("cdn.example.com/live/index.m3u8"));

        assert!(!is_plausible(""));
        assert!(!is_plausible("CCTV1"));
        assert!(!is_plausible("example.com"));
        assert!(!is_plausible("ftp://host/file"));
    }

    #[test]
    fn test_dynamic_placeholders() {
        assert!(has_dynamic_placeholders("http://x/?psid={PSID}"));
        assert!(has_dynamic_placeholders("http://x/?t=%7BTOKEN_2%7D"));
        assert!(has_dynamic_placeholders("http://x/?t=%7bTOKEN%7d"));
        assert!(!has_dynamic_placeholders("http://x/?psid={psid}"));
        assert!(!has_dynamic_placeholders("http://x/live.m3u8"));
    }

    #[test]
    fn test_is_http() {
        assert!(is_http("HTTPS://a/b"));
        assert!(!is_http("rtmp://a/b"));
        assert!(!is_http("10.0.0.5:8080/stream"));
    }
}
