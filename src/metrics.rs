use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder};

use crate::channels::ProbeState;

lazy_static! {
    pub static ref PROBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "iptv_validator_probes_total",
        "Probe verdicts by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref PROBE_LATENCY_MS: Histogram = register_histogram!(
        "iptv_validator_probe_latency_ms",
        "Time to first successful response per probed stream, in milliseconds",
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 3000.0, 5000.0, 10000.0]
    )
    .unwrap();
}

pub fn observe(state: ProbeState, latency_ms: Option<u64>) {
    let outcome = match state {
        ProbeState::Unknown => return,
        ProbeState::Ok => "ok",
        ProbeState::Fail => "fail",
        ProbeState::SkippedNonHttp => "skipped_non_http",
        ProbeState::SkippedTemplate => "skipped_template",
        ProbeState::SkippedFiltered => "skipped_filtered",
        ProbeState::Cancelled => "cancelled",
    };
    PROBES_TOTAL.with_label_values(&[outcome]).inc();
    if let Some(ms) = latency_ms {
        PROBE_LATENCY_MS.observe(ms as f64);
    }
}

pub fn gather_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_shows_up_in_exposition() {
        observe(ProbeState::Ok, Some(120));
        observe(ProbeState::Unknown, None);
        let text = gather_metrics().unwrap();
        assert!(text.contains("iptv_validator_probes_total{outcome=\"ok\"}"));
        assert!(text.contains("iptv_validator_probe_latency_ms_bucket"));
    }
}
