pub mod channels;
pub mod engine;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod net;
pub mod output;
pub mod playlist;
pub mod prober;
pub mod progress;
pub mod resolution;
pub mod settings;
pub mod stream_url;

pub use channels::{Channel, ChannelStore, ProbeState};
pub use engine::{Summary, ValidationEngine, ValidationReport};
pub use error::ValidatorError;
pub use prober::{HttpProber, Probe, ProbeOutcome};
pub use progress::{ProgressEvent, ProgressSink};
pub use settings::ValidatorSettings;

/// Builds an engine that probes over HTTP with the given settings.
pub fn http_engine(
    input: impl Into<std::path::PathBuf>,
    settings: ValidatorSettings,
) -> anyhow::Result<ValidationEngine<HttpProber>> {
    let prober = HttpProber::new(&settings)?;
    Ok(ValidationEngine::new(input, settings, prober))
}
