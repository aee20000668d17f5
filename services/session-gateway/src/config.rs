//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The backend URL can
//! be overridden with `SESSION_BACKEND_URL` so one file serves several
//! environments.

use serde::Deserialize;
use session_client::ClientConfig;
use session_store::{CookieOptions, DEFAULT_COOKIE_MAX_AGE, DEFAULT_COOKIE_PATH};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub cookies: CookieConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Backend session service settings
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Unset waits for the refresh call indefinitely
    #[serde(default)]
    pub refresh_timeout_secs: Option<u64>,
}

/// Session cookie settings
#[derive(Debug, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_max_age")]
    pub max_age_secs: u64,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_cookie_max_age(),
            path: default_cookie_path(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_cookie_max_age() -> u64 {
    DEFAULT_COOKIE_MAX_AGE.as_secs()
}

fn default_cookie_path() -> String {
    DEFAULT_COOKIE_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("SESSION_BACKEND_URL") {
            config.backend.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.backend.refresh_timeout_secs == Some(0) {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0 when set".into(),
            ));
        }

        if self.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.cookies.max_age_secs == 0 {
            return Err(common::Error::Config(
                "cookies.max_age_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Settings for the per-request session clients.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Some(Duration::from_secs(self.backend.timeout_secs)),
            refresh_timeout: self.backend.refresh_timeout_secs.map(Duration::from_secs),
            cookie: CookieOptions {
                max_age: Duration::from_secs(self.cookies.max_age_secs),
                path: self.cookies.path.clone(),
            },
            ..ClientConfig::new(self.backend.base_url.clone())
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-gateway.toml")
    }
}
