use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channels::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Probe,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelProgress {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<&Channel> for ChannelProgress {
    fn from(channel: &Channel) -> Self {
        let status = if channel.status.is_empty() {
            None
        } else {
            Some(channel.status.clone())
        };
        ChannelProgress {
            name: channel.name.clone(),
            url: channel.url.clone(),
            valid: channel.valid(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelProgress>,
    pub done: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn new(phase: Phase, done: usize, total: usize, message: impl Into<String>) -> Self {
        ProgressEvent {
            phase,
            progress: percent(done, total),
            message: message.into(),
            channel: None,
            done,
            total,
        }
    }

    pub fn with_channel(mut self, channel: ChannelProgress) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// `floor(100 * done / total)`, with an empty job counting as complete.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Push-only consumer of progress events. The engine calls it from a single
/// task, but sinks must still be shareable across threads.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Logs phase milestones at info and per-channel events at debug.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match &event.channel {
            Some(ch) if event.phase == Phase::Probe => debug!(
                "[{}/{}] {} {} valid={:?} status={}",
                event.done,
                event.total,
                ch.name,
                ch.url,
                ch.valid,
                ch.status.as_deref().unwrap_or("")
            ),
            _ => {
                if event.progress == 100 || event.done == 0 {
                    info!("{:?} {}%: {}", event.phase, event.progress, event.message);
                } else {
                    debug!("{:?} {}%: {}", event.phase, event.progress, event.message);
                }
            }
        }
    }
}

/// Forwards events into an mpsc channel so a transport (websocket, UI loop)
/// can consume them on its own task. A closed receiver is ignored.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// One JSON document per line on stdout.
pub struct JsonLinesSink;

impl ProgressSink for JsonLinesSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

/// Emits parse/write events only when the integer percentage moves, so a
/// large file does not flood the sink.
pub(crate) struct Throttle {
    phase: Phase,
    total: usize,
    last: Option<u8>,
}

impl Throttle {
    pub(crate) fn new(phase: Phase, total: usize) -> Self {
        Self { phase, total, last: None }
    }

    pub(crate) fn tick(
        &mut self,
        sink: &dyn ProgressSink,
        done: usize,
        message: impl FnOnce() -> String,
        channel: Option<&Channel>,
    ) {
        let pct = percent(done, self.total);
        if self.last.is_some_and(|last| last >= pct) {
            return;
        }
        self.last = Some(pct);
        let mut event = ProgressEvent::new(self.phase, done, self.total, message());
        if let Some(channel) = channel {
            event = event.with_channel(channel.into());
        }
        sink.emit(event);
    }
}
