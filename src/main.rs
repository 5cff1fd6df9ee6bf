use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use iptv_validator::progress::{JsonLinesSink, ProgressSink, TracingSink};
use iptv_validator::{http_engine, metrics, ValidatorError, ValidatorSettings};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Playlist to validate (.m3u/.m3u8, .txt with #genre# markers, or .json)
    input: PathBuf,

    /// Number of concurrent probes (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<f64>,

    /// Skip channels whose name marks them as low resolution
    #[arg(long)]
    filter_low: bool,

    /// Directory for the *_valid.{m3u,txt,json} artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, default_value = "validator.toml")]
    config: String,

    /// Print progress events as JSON lines on stdout
    #[arg(long)]
    json_progress: bool,

    /// Write Prometheus metrics in text format to this file after the run
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

const EXIT_CANCELLED: u8 = 130;

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut settings = ValidatorSettings::load(&args.config)?;
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout;
    }
    if args.filter_low {
        settings.filter_low = true;
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }
    let settings = settings.sanitized();
    info!("Configuration: {:?}", settings);

    let engine = http_engine(&args.input, settings)?;

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling outstanding probes");
            cancel.cancel();
        }
    });

    let sink: Box<dyn ProgressSink> = if args.json_progress {
        Box::new(JsonLinesSink)
    } else {
        Box::new(TracingSink)
    };

    let report = engine.run(sink.as_ref()).await?;

    if let Some(path) = &args.metrics_out {
        std::fs::write(path, metrics::gather_metrics()?)?;
        info!("Metrics written to {}", path.display());
    }

    eprintln!("{}", serde_json::to_string_pretty(&report.summary)?);
    for path in report.outputs.all() {
        info!("Output: {}", path.display());
    }

    if report.summary.cancelled {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<ValidatorError>())
                .map(ValidatorError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
