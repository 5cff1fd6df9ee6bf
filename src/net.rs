use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::warn;

use crate::settings::ProbeConfig;

/// Builds the HTTP client shared by every probe of a run. This is the only
/// place that decides on certificate verification, redirects and the
/// `User-Agent`; the client is dropped together with its prober.
pub fn build_client(config: &ProbeConfig, workers: usize) -> reqwest::Result<reqwest::Client> {
    if config.insecure_tls {
        warn!("TLS certificate verification is disabled for stream probes");
    }
    let mut builder = reqwest::Client::builder();
    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }
    builder
        .user_agent(config.user_agent.as_str())
        .redirect(Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(config.insecure_tls)
        .pool_max_idle_per_host(workers.max(1))
        .tcp_keepalive(Duration::from_secs(10))
        .build()
}
