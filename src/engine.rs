use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channels::{ChannelStore, ProbeState};
use crate::error::ValidatorError;
use crate::metrics;
use crate::output::{self, OutputPaths};
use crate::playlist::{self, LoadInfo};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::prober::{self, Probe, ProbeOutcome};
use crate::settings::ValidatorSettings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub not_probed: usize,
    pub duplicates_dropped: usize,
    pub malformed_records: usize,
    pub categories: Vec<String>,
    pub elapsed_ms: u64,
    pub cancelled: bool,
}

impl Summary {
    pub fn from_store(store: &ChannelStore, malformed_records: usize, elapsed_ms: u64, cancelled: bool) -> Self {
        Summary {
            total: store.len(),
            valid: store.channels().iter().filter(|c| c.is_valid()).count(),
            invalid: store.count(ProbeState::Fail),
            filtered: store.count(ProbeState::SkippedFiltered),
            not_probed: store.count(ProbeState::Cancelled) + store.count(ProbeState::Unknown),
            duplicates_dropped: store.duplicates_dropped(),
            malformed_records,
            categories: store
                .grouped(|_| true)
                .into_iter()
                .map(|(name, _)| name.to_string())
                .collect(),
            elapsed_ms,
            cancelled,
        }
    }
}

#[derive(Debug)]
pub struct ValidationReport {
    pub summary: Summary,
    pub store: ChannelStore,
    pub input: LoadInfo,
    pub outputs: OutputPaths,
    /// Probes that actually completed (as opposed to being cancelled).
    pub probes_done: usize,
    pub probes_total: usize,
}

/// Drives parse → low-resolution filter → concurrent probing → output for
/// one input file. A single orchestrator loop owns the store and the sink;
/// probes only hand their outcomes back to it.
pub struct ValidationEngine<P: Probe> {
    input: PathBuf,
    settings: ValidatorSettings,
    prober: Arc<P>,
    cancel: CancellationToken,
}

impl<P: Probe> ValidationEngine<P> {
    pub fn new(input: impl Into<PathBuf>, settings: ValidatorSettings, prober: P) -> Self {
        Self {
            input: input.into(),
            settings: settings.sanitized(),
            prober: Arc::new(prober),
            cancel: CancellationToken::new(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Stops the run: nothing new is submitted, in-flight probes are
    /// abandoned and `run` returns with what it has.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle onto the run's cancellation token, e.g. for a Ctrl-C task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, sink: &dyn ProgressSink) -> Result<ValidationReport, ValidatorError> {
        let started = Instant::now();

        let (mut store, load_info) = playlist::load(&self.input, sink)?;

        if self.settings.filter_low {
            let filtered = store.filter_low();
            for _ in 0..filtered {
                metrics::observe(ProbeState::SkippedFiltered, None);
            }
            info!("Filtered {} low-resolution channels before probing", filtered);
        }

        let (probes_done, probes_total) = self.probe_all(&mut store, sink).await;
        let cancelled = self.cancel.is_cancelled();

        let summary = Summary::from_store(
            &store,
            load_info.malformed,
            started.elapsed().as_millis() as u64,
            cancelled,
        );
        let outputs = output::write_all(&store, &summary, &self.input, &self.settings.output_dir, sink)?;

        info!(
            "Validation {}: {} channels, {} valid, {} invalid, {} filtered, {} not probed, {} duplicates dropped in {} ms",
            if cancelled { "cancelled" } else { "finished" },
            summary.total,
            summary.valid,
            summary.invalid,
            summary.filtered,
            summary.not_probed,
            summary.duplicates_dropped,
            summary.elapsed_ms
        );

        Ok(ValidationReport {
            summary,
            store,
            input: load_info,
            outputs,
            probes_done,
            probes_total,
        })
    }

    /// Probes every pending channel with at most `workers` in flight.
    /// Returns `(done, total)`.
    async fn probe_all(&self, store: &mut ChannelStore, sink: &dyn ProgressSink) -> (usize, usize) {
        let work: Vec<(usize, crate::channels::Channel)> = store
            .pending()
            .into_iter()
            .filter_map(|i| store.get(i).cloned().map(|c| (i, c)))
            .collect();
        let total = work.len();
        let workers = self.settings.workers;
        let mut done = 0;

        info!("Probing {} channels with {} workers", total, workers);
        sink.emit(ProgressEvent::new(
            Phase::Probe,
            0,
            total,
            format!("probing {total} channels"),
        ));

        let results = stream::iter(work)
            .map(|(index, channel)| {
                let prober = Arc::clone(&self.prober);
                let cancel = self.cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (index, ProbeOutcome::cancelled());
                    }
                    let outcome = match prober::preflight(&channel.url) {
                        Some(outcome) => outcome,
                        None => prober.probe(&channel, &cancel).await,
                    };
                    (index, outcome)
                }
            })
            .buffer_unordered(workers);
        let mut results = pin!(results);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = results.next() => next,
            };
            let Some((index, outcome)) = next else {
                break;
            };
            if outcome.state == ProbeState::Cancelled {
                continue;
            }

            metrics::observe(outcome.state, outcome.latency_ms);
            store.settle(
                index,
                outcome.state,
                outcome.status,
                outcome.latency_ms,
                outcome.resolution_measured,
            );
            done += 1;

            if let Some(channel) = store.get(index) {
                sink.emit(
                    ProgressEvent::new(Phase::Probe, done, total, format!("probed {done} of {total}"))
                        .with_channel(channel.into()),
                );
            }
        }

        let unfinished = store.pending();
        if !unfinished.is_empty() {
            warn!("Run cancelled with {} channels not probed", unfinished.len());
            for index in unfinished {
                store.settle(index, ProbeState::Cancelled, prober::STATUS_CANCELLED, None, None);
                metrics::observe(ProbeState::Cancelled, None);
            }
        }

        (done, total)
    }
}
