//! Runtime configuration: defaults, an optional YAML file and command line
//! overrides, in that order of precedence.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use http::Uri;
use serde::Deserialize;

use crate::workspaces::default_endpoint;

/// Upper bound the inventory API accepts for a page.
pub const MAX_PAGE_SIZE: u32 = 25;

/// Longest refresh interval accepted, in seconds (30 days).
pub const MAX_REFRESH_INTERVAL: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config file {path:?} failed, {err}")]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },
    #[error("parse config failed, {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("pages must be at least 1")]
    ZeroPages,
    #[error("page size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    PageSize(u32),
    #[error("refresh interval must be between 1 and {MAX_REFRESH_INTERVAL} seconds, got {0}")]
    RefreshInterval(u64),
    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,
    #[error("exporter port must be greater than zero")]
    ZeroExporterPort,
    #[error("telemetry path {0:?} must start with '/' and must not be '/'")]
    TelemetryPath(String),
    #[error("profile must not be empty")]
    EmptyProfile,
    #[error("invalid endpoint {endpoint:?}, {reason}")]
    Endpoint { endpoint: String, reason: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// File the target groups are written to.
    pub output: PathBuf,

    /// Seconds between two polls.
    pub refresh_interval: u64,

    /// Maximum pages fetched per poll.
    pub pages: usize,

    /// Records per page, the API picks its own default when unset.
    pub page_size: Option<u32>,

    /// Port of the exporter running on every WorkSpace.
    pub exporter_port: u16,

    /// Credential profile, only reported.
    pub profile: Option<String>,

    pub region: String,

    /// Defaults to the regional endpoint.
    pub endpoint: Option<String>,

    /// Seconds a single page request may take.
    pub request_timeout: u64,

    pub listen: SocketAddr,

    pub telemetry_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: PathBuf::from("workspaces_sd.json"),
            refresh_interval: 24 * 60 * 60,
            pages: 1,
            page_size: None,
            exporter_port: 9182,
            profile: None,
            region: "ap-southeast-2".to_string(),
            endpoint: None,
            request_timeout: 10,
            listen: SocketAddr::from(([0, 0, 0, 0], 9888)),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub refresh_interval: Option<u64>,
    pub pages: Option<usize>,
    pub page_size: Option<u32>,
    pub exporter_port: Option<u16>,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub request_timeout: Option<u64>,
    pub listen: Option<SocketAddr>,
    pub telemetry_path: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;

        Config::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Config, ConfigError> {
        // an empty document means "all defaults"
        if text.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yaml::from_str(text).map_err(Into::into)
    }

    pub fn merge(mut self, overrides: Overrides) -> Config {
        let Overrides {
            output,
            refresh_interval,
            pages,
            page_size,
            exporter_port,
            profile,
            region,
            endpoint,
            request_timeout,
            listen,
            telemetry_path,
        } = overrides;

        if let Some(output) = output {
            self.output = output;
        }
        if let Some(refresh_interval) = refresh_interval {
            self.refresh_interval = refresh_interval;
        }
        if let Some(pages) = pages {
            self.pages = pages;
        }
        if page_size.is_some() {
            self.page_size = page_size;
        }
        if let Some(exporter_port) = exporter_port {
            self.exporter_port = exporter_port;
        }
        if profile.is_some() {
            self.profile = profile;
        }
        if let Some(region) = region {
            self.region = region;
        }
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
        if let Some(request_timeout) = request_timeout {
            self.request_timeout = request_timeout;
        }
        if let Some(listen) = listen {
            self.listen = listen;
        }
        if let Some(telemetry_path) = telemetry_path {
            self.telemetry_path = telemetry_path;
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pages == 0 {
            return Err(ConfigError::ZeroPages);
        }

        if let Some(size) = self.page_size {
            if !(1..=MAX_PAGE_SIZE).contains(&size) {
                return Err(ConfigError::PageSize(size));
            }
        }

        if !(1..=MAX_REFRESH_INTERVAL).contains(&self.refresh_interval) {
            return Err(ConfigError::RefreshInterval(self.refresh_interval));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }

        if self.exporter_port == 0 {
            return Err(ConfigError::ZeroExporterPort);
        }

        if !self.telemetry_path.starts_with('/') || self.telemetry_path == "/" {
            return Err(ConfigError::TelemetryPath(self.telemetry_path.clone()));
        }

        if self.profile.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyProfile);
        }

        self.endpoint()?;

        Ok(())
    }

    /// The configured endpoint, or the regional default.
    pub fn endpoint(&self) -> Result<Uri, ConfigError> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => default_endpoint(&self.region),
        };

        let uri = endpoint
            .parse::<Uri>()
            .map_err(|err| ConfigError::Endpoint {
                endpoint: endpoint.clone(),
                reason: err.to_string(),
            })?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(ConfigError::Endpoint {
                    endpoint,
                    reason: "scheme must be http or https".to_string(),
                });
            }
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(ConfigError::Endpoint {
                endpoint,
                reason: "host is missing".to_string(),
            });
        }

        Ok(uri)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
