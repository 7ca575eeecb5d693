use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://pythonapiyukfit.up.railway.app";
pub const DEFAULT_ALLOWED_ORIGINS: &str =
    "https://yukfit.netlify.app,http://localhost:8080,http://localhost:5173";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Invalid upstream base url {0}: {1}")]
    InvalidUpstreamUrl(String, String),

    #[error("Upstream timeout must be greater than 0")]
    InvalidTimeout,

    #[error("Request body limit must be greater than 0")]
    InvalidBodyLimit,

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    #[serde(default)]
    pub listener: Listener,
    /// Optional listener serving /health and /ready for orchestrators
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    /// Prediction service the recommend route is forwarded to
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Browser origins that receive CORS headers. Normalized at startup.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: None,
            upstream: UpstreamConfig::default(),
            allowed_origins: default_allowed_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Config {
    /// Overrides file values with the environment-style settings the gateway
    /// has always been deployed with. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.listener.port = parse_env("PORT", &port)?;
        }
        if let Some(host) = lookup("HOST") {
            self.listener.host = host;
        }
        if let Some(base_url) = lookup("PYTHON_API") {
            self.upstream.base_url = base_url;
        }
        if let Some(path) = lookup("PYTHON_RECOMMEND_PATH") {
            self.upstream.recommend_path = Some(path);
        }
        if let Some(timeout) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse_env("UPSTREAM_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = split_origins(&origins);
        }
        Ok(())
    }

    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
        }
        self.upstream.validate()?;

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Upstream prediction service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the prediction service. Trailing slashes are ignored.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Explicit recommend path. When unset the default candidate paths are
    /// searched in order.
    #[serde(default)]
    pub recommend_path: Option<String>,
    /// Timeout for each individual attempt against the upstream
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: default_base_url(),
            recommend_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    /// Base URL without trailing slashes, ready to have a path appended.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// The explicit recommend path, if one is configured and non-empty.
    pub fn explicit_path(&self) -> Option<String> {
        let path = self.recommend_path.as_deref()?.trim();
        match path {
            "" => None,
            p if p.starts_with('/') => Some(p.to_string()),
            p => Some(format!("/{p}")),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let base = self.normalized_base_url();
        let url = Url::parse(base)
            .map_err(|e| ValidationError::InvalidUpstreamUrl(base.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ValidationError::InvalidUpstreamUrl(
                base.to_string(),
                "expected an http(s) url with a host".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: &str) -> Result<T, ValidationError> {
    value.trim().parse().map_err(|_| ValidationError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

fn split_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

fn default_allowed_origins() -> Vec<String> {
    split_origins(DEFAULT_ALLOWED_ORIGINS)
}

fn default_base_url() -> String {
    DEFAULT_UPSTREAM_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    100 * 1024
}
