use std::collections::HashSet;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::resolution::{self, ResolutionClass};

pub const DEFAULT_CATEGORY: &str = "未分类";

/// Where a channel stands in the probe lifecycle. Everything but `Unknown`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    #[default]
    Unknown,
    Ok,
    Fail,
    SkippedNonHttp,
    SkippedTemplate,
    SkippedFiltered,
    Cancelled,
}

impl ProbeState {
    pub fn is_terminal(self) -> bool {
        self != ProbeState::Unknown
    }

    /// Tri-state validity: `None` while unknown or when the channel never got
    /// a verdict (filtered).
    pub fn valid(self) -> Option<bool> {
        match self {
            ProbeState::Ok | ProbeState::SkippedNonHttp | ProbeState::SkippedTemplate => Some(true),
            ProbeState::Fail | ProbeState::Cancelled => Some(false),
            ProbeState::Unknown | ProbeState::SkippedFiltered => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_logo: Option<String>,
    /// EXTINF attributes beyond the tvg-* and group-title ones, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_attributes: Vec<(String, String)>,
    pub resolution_from_name: Option<String>,
    pub resolution_measured: Option<String>,
    pub state: ProbeState,
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        let mut channel = Channel {
            name: name.into(),
            url: url.into(),
            category: category.into(),
            tvg_id: None,
            tvg_name: None,
            tvg_logo: None,
            extra_attributes: Vec::new(),
            resolution_from_name: None,
            resolution_measured: None,
            state: ProbeState::Unknown,
            status: String::new(),
            latency_ms: None,
        };
        channel.refresh_resolution();
        channel
    }

    /// Re-derives `resolution_from_name`; call after changing the name or
    /// any attribute. The name, `tvg-name` and other attributes are consulted
    /// in that order; the URL path and query only when none of them is tagged.
    pub fn refresh_resolution(&mut self) {
        let url_tail = url_path_and_query(&self.url);
        let mut haystacks: Vec<&str> = vec![self.name.as_str()];
        if let Some(tvg_name) = &self.tvg_name {
            haystacks.push(tvg_name);
        }
        haystacks.extend(self.extra_attributes.iter().map(|(_, v)| v.as_str()));
        haystacks.extend(url_tail.as_deref());
        self.resolution_from_name = resolution::infer(haystacks).map(|r| r.label);
    }

    pub fn resolution_class(&self) -> ResolutionClass {
        self.resolution_from_name
            .as_deref()
            .map(resolution::classify_label)
            .unwrap_or(ResolutionClass::Unknown)
    }

    pub fn valid(&self) -> Option<bool> {
        self.state.valid()
    }

    pub fn is_valid(&self) -> bool {
        self.valid() == Some(true)
    }
}

// Host names like `sd.cdn.example` say nothing about the stream itself.
fn url_path_and_query(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    })
}

/// Insertion-ordered channel collection, deduplicated on the normalized URL.
#[derive(Debug, Default, Clone)]
pub struct ChannelStore {
    channels: Vec<Channel>,
    categories: Vec<String>,
    seen_urls: HashSet<String>,
    duplicates_dropped: usize,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_category(&mut self, name: &str) {
        if !self.categories.iter().any(|c| c == name) {
            self.categories.push(name.to_string());
        }
    }

    /// Keeps the first record seen for a URL; later ones only bump the
    /// duplicate counter.
    pub fn insert(&mut self, channel: Channel) -> bool {
        if !self.seen_urls.insert(channel.url.clone()) {
            self.duplicates_dropped += 1;
            return false;
        }
        self.declare_category(&channel.category);
        self.channels.push(channel);
        true
    }

    pub fn extend<I: IntoIterator<Item = Channel>>(&mut self, channels: I) {
        for channel in channels {
            self.insert(channel);
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Every category in first-appearance order, including empty ones.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Categories in first-appearance order with the channels matching
    /// `keep`, in insertion order. Categories left empty are omitted.
    pub fn grouped<F>(&self, keep: F) -> Vec<(&str, Vec<&Channel>)>
    where
        F: Fn(&Channel) -> bool,
    {
        self.categories
            .iter()
            .filter_map(|category| {
                let members: Vec<&Channel> = self
                    .channels
                    .iter()
                    .filter(|c| &c.category == category && keep(c))
                    .collect();
                if members.is_empty() {
                    None
                } else {
                    Some((category.as_str(), members))
                }
            })
            .collect()
    }

    /// Indices of channels still waiting for a verdict, in insertion order.
    pub fn pending(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.state == ProbeState::Unknown)
            .map(|(i, _)| i)
            .collect()
    }

    /// Moves a channel to a terminal state. Returns `false` (and changes
    /// nothing) if the channel already had a verdict.
    pub fn settle(
        &mut self,
        index: usize,
        state: ProbeState,
        status: impl Into<String>,
        latency_ms: Option<u64>,
        resolution_measured: Option<String>,
    ) -> bool {
        let Some(channel) = self.channels.get_mut(index) else {
            return false;
        };
        if channel.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        channel.state = state;
        channel.status = status.into();
        channel.latency_ms = latency_ms;
        channel.resolution_measured = resolution_measured;
        true
    }

    /// Routes every still-unknown low-resolution channel to the filtered
    /// partition. Returns how many were moved.
    pub fn filter_low(&mut self) -> usize {
        let low: Vec<usize> = self
            .pending()
            .into_iter()
            .filter(|&i| self.channels[i].resolution_class() == ResolutionClass::Low)
            .collect();
        for &i in &low {
            self.settle(i, ProbeState::SkippedFiltered, "filtered_low_resolution", None, None);
        }
        low.len()
    }

    pub fn count(&self, state: ProbeState) -> usize {
        self.channels.iter().filter(|c| c.state == state).count()
    }
}
