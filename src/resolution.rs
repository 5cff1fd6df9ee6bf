use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionClass {
    Ultra,
    High,
    Standard,
    Low,
    Unknown,
}

struct Rule {
    pattern: Regex,
    class: ResolutionClass,
}

// Latin tags need a non-alphanumeric neighbour on both sides so that "HDTV"
// or "FHDX" never count; the Chinese tags match anywhere.
fn tag_rule(tags: &str, class: ResolutionClass) -> Rule {
    let pattern = format!(r"(?i)(?:^|[^a-z0-9])({tags})(?:$|[^a-z0-9])");
    Rule {
        pattern: Regex::new(&pattern).unwrap(),
        class,
    }
}

lazy_static! {
    static ref RULES: Vec<Rule> = vec![
        tag_rule("4k|uhd|2160p", ResolutionClass::Ultra),
        Rule {
            pattern: Regex::new("(超高清)").unwrap(),
            class: ResolutionClass::Ultra,
        },
        tag_rule("1080p|1080i|fhd", ResolutionClass::High),
        Rule {
            pattern: Regex::new("(高清)").unwrap(),
            class: ResolutionClass::High,
        },
        tag_rule("720p|hd", ResolutionClass::High),
        tag_rule("576p|480p|sd", ResolutionClass::Low),
        Rule {
            pattern: Regex::new("(标清)").unwrap(),
            class: ResolutionClass::Low,
        },
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub label: String,
    pub class: ResolutionClass,
}

fn label_for(tag: &str) -> &'static str {
    match tag.to_ascii_lowercase().as_str() {
        "4k" | "uhd" | "2160p" | "超高清" => "4K",
        "1080p" | "1080i" | "fhd" | "高清" => "1080p",
        "720p" | "hd" => "720p",
        "576p" => "576p",
        "480p" => "480p",
        _ => "SD",
    }
}

fn infer_in(text: &str) -> Option<Resolution> {
    RULES.iter().find_map(|rule| {
        rule.pattern.captures(text).map(|caps| Resolution {
            label: label_for(&caps[1]).to_string(),
            class: rule.class,
        })
    })
}

/// Consults the haystacks in order and returns the first one carrying a tag.
/// Within one haystack the rules apply in priority order.
pub fn infer<'a, I>(haystacks: I) -> Option<Resolution>
where
    I: IntoIterator<Item = &'a str>,
{
    haystacks.into_iter().find_map(infer_in)
}

pub fn classify_label(label: &str) -> ResolutionClass {
    match label {
        "4K" => ResolutionClass::Ultra,
        "1080p" | "720p" => ResolutionClass::High,
        "576p" | "480p" | "SD" => ResolutionClass::Low,
        _ => ResolutionClass::Unknown,
    }
}

/// Maps a measured frame height (from an HLS `RESOLUTION=WxH`) to a label.
pub fn label_for_height(height: u32) -> &'static str {
    match height {
        h if h >= 2160 => "4K",
        h if h >= 1080 => "1080p",
        h if h >= 720 => "720p",
        h if h >= 576 => "576p",
        h if h >= 480 => "480p",
        _ => "SD",
    }
}

pub fn class_for_height(height: u32) -> ResolutionClass {
    match height {
        h if h >= 2160 => ResolutionClass::Ultra,
        h if h >= 720 => ResolutionClass::High,
        h if h > 576 => ResolutionClass::Standard,
        _ => ResolutionClass::Low,
    }
}
