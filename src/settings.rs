use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub filter_low: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// The one switch for certificate verification.
    #[serde(default = "default_insecure_tls")]
    pub insecure_tls: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_follow_segments")]
    pub follow_segments: bool,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
}

fn default_workers() -> usize {
    10
}

fn default_timeout_secs() -> f64 {
    3.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_redirects() -> usize {
    5
}

fn default_insecure_tls() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_follow_segments() -> bool {
    true
}

fn default_use_system_proxy() -> bool {
    true
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            insecure_tls: default_insecure_tls(),
            max_body_bytes: default_max_body_bytes(),
            follow_segments: default_follow_segments(),
            use_system_proxy: default_use_system_proxy(),
        }
    }
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            filter_low: false,
            output_dir: default_output_dir(),
            probe: ProbeConfig::default(),
        }
    }
}

impl ValidatorSettings {
    /// Optional TOML file, then `IPTV_VALIDATOR__*` environment variables.
    /// A missing file is not an error.
    pub fn load(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("IPTV_VALIDATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: ValidatorSettings = settings.try_deserialize()?;
        Ok(settings.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.workers = self.workers.max(1);
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            self.timeout_secs = default_timeout_secs();
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_missing() {
        let settings = ValidatorSettings::load("/nonexistent/validator-settings").unwrap();
        assert_eq!(settings.workers, 10);
        assert_eq!(settings.timeout(), Duration::from_secs(3));
        assert!(!settings.filter_low);
        assert!(settings.probe.insecure_tls);
        assert_eq!(settings.output_dir, PathBuf::from("outputs"));
    }

    #[test]
    fn test_file_overrides_and_sanitizing() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "workers = 0\ntimeout_secs = 1.5\nfilter_low = true\n\n[probe]\ninsecure_tls = false\nmax_redirects = 2"
        )
        .unwrap();

        let settings = ValidatorSettings::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.timeout(), Duration::from_millis(1500));
        assert!(settings.filter_low);
        assert!(!settings.probe.insecure_tls);
        assert_eq!(settings.probe.max_redirects, 2);
        assert_eq!(settings.probe.max_body_bytes, 64 * 1024);
    }
}
