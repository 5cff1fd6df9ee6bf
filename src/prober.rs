use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channels::{Channel, ProbeState};
use crate::hls;
use crate::net;
use crate::resolution;
use crate::settings::ValidatorSettings;
use crate::stream_url;

pub const STATUS_OK: &str = "ok";
pub const STATUS_SEGMENT_UNREACHABLE: &str = "ok_segment_unreachable";
pub const STATUS_INVALID_SHAPE: &str = "invalid_url_shape";
pub const STATUS_PLACEHOLDER: &str = "dynamic_placeholder_not_probed";
pub const STATUS_NON_HTTP: &str = "non_http_not_probed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Transport and HTTP failures. `Display` is the status string recorded on
/// the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("timeout")]
    Timeout,
    #[error("dns_error")]
    Dns,
    #[error("connection_refused")]
    ConnectionRefused,
    #[error("connect_error")]
    Connect,
    #[error("tls_error")]
    Tls,
    #[error("too_many_redirects")]
    TooManyRedirects,
    #[error("http_{0}")]
    Http(u16),
    #[error("request_error")]
    Request,
}

impl ProbeFailure {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProbeFailure::Timeout;
        }
        if err.is_redirect() {
            return ProbeFailure::TooManyRedirects;
        }
        if let Some(status) = err.status() {
            return ProbeFailure::Http(status.as_u16());
        }

        let mut chain = String::new();
        let mut source: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = source {
            chain.push_str(&e.to_string().to_ascii_lowercase());
            chain.push(' ');
            source = e.source();
        }

        if chain.contains("dns error")
            || chain.contains("failed to lookup")
            || chain.contains("name or service not known")
            || chain.contains("no such host")
        {
            ProbeFailure::Dns
        } else if chain.contains("connection refused") {
            ProbeFailure::ConnectionRefused
        } else if chain.contains("certificate")
            || chain.contains("tls")
            || chain.contains("handshake")
            || chain.contains("alert")
        {
            ProbeFailure::Tls
        } else if chain.contains("timed out") {
            ProbeFailure::Timeout
        } else if err.is_connect() {
            ProbeFailure::Connect
        } else {
            ProbeFailure::Request
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub state: ProbeState,
    pub status: String,
    pub latency_ms: Option<u64>,
    pub resolution_measured: Option<String>,
}

impl ProbeOutcome {
    pub fn new(state: ProbeState, status: impl Into<String>) -> Self {
        ProbeOutcome {
            state,
            status: status.into(),
            latency_ms: None,
            resolution_measured: None,
        }
    }

    pub fn ok(status: &str, latency_ms: u64, resolution_measured: Option<String>) -> Self {
        ProbeOutcome {
            state: ProbeState::Ok,
            status: status.to_string(),
            latency_ms: Some(latency_ms),
            resolution_measured,
        }
    }

    pub fn failed(failure: ProbeFailure, latency_ms: Option<u64>) -> Self {
        ProbeOutcome {
            state: ProbeState::Fail,
            status: failure.to_string(),
            latency_ms,
            resolution_measured: None,
        }
    }

    pub fn cancelled() -> Self {
        ProbeOutcome::new(ProbeState::Cancelled, STATUS_CANCELLED)
    }

    pub fn valid(&self) -> bool {
        self.state.valid() == Some(true)
    }
}

/// Decides without any I/O whether a URL can be probed at all. `None` means
/// an HTTP probe is required.
pub fn preflight(url: &str) -> Option<ProbeOutcome> {
    if !stream_url::is_plausible(url) {
        return Some(ProbeOutcome::new(ProbeState::Fail, STATUS_INVALID_SHAPE));
    }
    if stream_url::has_dynamic_placeholders(url) {
        return Some(ProbeOutcome::new(ProbeState::SkippedTemplate, STATUS_PLACEHOLDER));
    }
    if !stream_url::is_http(url) {
        return Some(ProbeOutcome::new(ProbeState::SkippedNonHttp, STATUS_NON_HTTP));
    }
    None
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// Probes one channel. Implementations return `cancelled` when the token
    /// fires before or during the request.
    async fn probe(&self, channel: &Channel, cancel: &CancellationToken) -> ProbeOutcome;
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn looks_like_manifest_url(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".m3u8")
}

pub struct HttpProber {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
    follow_segments: bool,
}

impl HttpProber {
    pub fn new(settings: &ValidatorSettings) -> reqwest::Result<Self> {
        Ok(Self {
            client: net::build_client(&settings.probe, settings.workers)?,
            timeout: settings.timeout(),
            max_body_bytes: settings.probe.max_body_bytes,
            follow_segments: settings.probe.follow_segments,
        })
    }

    async fn read_bounded(&self, mut response: Response) -> BytesMut {
        let mut buf = BytesMut::new();
        while buf.len() < self.max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    debug!("body read stopped after {} bytes: {}", buf.len(), e);
                    break;
                }
            }
        }
        buf.truncate(self.max_body_bytes);
        buf
    }

    /// HEAD first; GET when HEAD is refused or when the stream looks like an
    /// HLS manifest worth opening.
    async fn probe_http(&self, url: &str) -> ProbeOutcome {
        let started = Instant::now();
        let mut head_latency = None;

        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency = elapsed_ms(started);
                let manifest = hls::is_manifest_content_type(&content_type(&resp))
                    || looks_like_manifest_url(resp.url());
                if !manifest || !self.follow_segments {
                    return ProbeOutcome::ok(STATUS_OK, latency, None);
                }
                head_latency = Some(latency);
            }
            Ok(resp) => debug!("HEAD {} -> {}, retrying with GET", url, resp.status()),
            Err(e) if e.is_timeout() => return ProbeOutcome::failed(ProbeFailure::Timeout, None),
            Err(e) => debug!("HEAD {} failed ({}), retrying with GET", url, e),
        }

        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                if let Some(latency) = head_latency {
                    return ProbeOutcome::ok(STATUS_OK, latency, None);
                }
                return ProbeOutcome::failed(
                    ProbeFailure::Http(resp.status().as_u16()),
                    Some(elapsed_ms(started)),
                );
            }
            Err(e) => {
                if let Some(latency) = head_latency {
                    return ProbeOutcome::ok(STATUS_OK, latency, None);
                }
                return ProbeOutcome::failed(ProbeFailure::classify(&e), None);
            }
        };

        let latency = head_latency.unwrap_or_else(|| elapsed_ms(started));
        let final_url = response.url().clone();
        let declared_manifest = hls::is_manifest_content_type(&content_type(&response));
        let body = self.read_bounded(response).await;

        if declared_manifest || hls::is_manifest_body(&body) {
            return self.follow_manifest(&final_url, &body, latency).await;
        }
        ProbeOutcome::ok(STATUS_OK, latency, None)
    }

    /// Reads the advertised resolution and fetches the first referenced URI
    /// once. A failing segment never fails the channel.
    async fn follow_manifest(&self, base: &Url, body: &[u8], latency: u64) -> ProbeOutcome {
        let text = String::from_utf8_lossy(body);
        let measured = hls::max_height(&text).map(|h| resolution::label_for_height(h).to_string());
        if !self.follow_segments {
            return ProbeOutcome::ok(STATUS_OK, latency, measured);
        }
        let Some(target) = hls::first_uri(&text).and_then(|uri| hls::resolve(base, uri)) else {
            return ProbeOutcome::ok(STATUS_OK, latency, measured);
        };

        let status = match self.client.get(target.clone()).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.read_bounded(resp).await;
                STATUS_OK
            }
            Ok(resp) => {
                debug!("segment {} -> {}", target, resp.status());
                STATUS_SEGMENT_UNREACHABLE
            }
            Err(e) => {
                debug!("segment {} failed: {}", target, e);
                STATUS_SEGMENT_UNREACHABLE
            }
        };
        ProbeOutcome::ok(status, latency, measured)
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, channel: &Channel, cancel: &CancellationToken) -> ProbeOutcome {
        if let Some(outcome) = preflight(&channel.url) {
            return outcome;
        }
        if cancel.is_cancelled() {
            return ProbeOutcome::cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => ProbeOutcome::cancelled(),
            outcome = self.probe_http(&channel.url) => outcome,
        }
    }
}
