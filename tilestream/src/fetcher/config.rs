//! Configuration for the remote tile fetcher.

use std::path::Path;
use std::time::Duration;

use ini::Ini;

use super::error::FetcherError;
use super::http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

/// Default number of concurrent network connections.
pub const DEFAULT_NUM_CONNECTIONS: usize = 16;

/// INI section read by [`FetcherConfig::from_ini_file`].
pub const CONFIG_SECTION: &str = "fetcher";

/// Configuration for a [`RemoteTileFetcher`](super::RemoteTileFetcher).
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Name used in diagnostics.
    pub name: String,

    /// Maximum number of requests on the network at once.
    pub num_connections: usize,

    /// Log every request state transition at debug level.
    pub debug_mode: bool,

    /// Timeout for requests whose locator carries none.
    pub default_timeout: Duration,

    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            num_connections: DEFAULT_NUM_CONNECTIONS,
            debug_mode: false,
            default_timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    /// Create a configuration with the given name and connection count.
    pub fn new(name: impl Into<String>, num_connections: usize) -> Self {
        Self {
            name: name.into(),
            num_connections,
            ..Default::default()
        }
    }

    /// Set the diagnostic name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum concurrent connections.
    pub fn with_num_connections(mut self, num_connections: usize) -> Self {
        self.num_connections = num_connections;
        self
    }

    /// Enable or disable per-transition diagnostics.
    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Set the fallback request timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks values that cannot be fixed up at runtime.
    pub fn validate(&self) -> Result<(), FetcherError> {
        if self.num_connections == 0 {
            return Err(FetcherError::InvalidConnections);
        }
        if self.default_timeout.is_zero() {
            return Err(FetcherError::InvalidTimeout);
        }
        Ok(())
    }

    /// Loads a configuration from an INI file.
    ///
    /// Starts from the defaults and overlays the `[fetcher]` section:
    ///
    /// ```ini
    /// [fetcher]
    /// name = imagery
    /// connections = 8
    /// debug = false
    /// timeout_secs = 15
    /// user_agent = my-viewer/1.0
    /// ```
    pub fn from_ini_file(path: &Path) -> Result<Self, FetcherError> {
        let ini = Ini::load_from_file(path).map_err(|e| FetcherError::ConfigRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Same as [`from_ini_file`](Self::from_ini_file) for INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, FetcherError> {
        let ini = Ini::load_from_str(text).map_err(|e| FetcherError::ConfigRead {
            path: "<string>".into(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, FetcherError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(CONFIG_SECTION)) {
            if let Some(v) = section.get("name") {
                let v = v.trim();
                if !v.is_empty() {
                    config.name = v.to_string();
                }
            }
            if let Some(v) = section.get("connections") {
                config.num_connections = match v.trim().parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(invalid("connections", v, "expected a positive integer"));
                    }
                };
            }
            if let Some(v) = section.get("debug") {
                config.debug_mode = parse_bool(v)
                    .ok_or_else(|| invalid("debug", v, "expected true or false"))?;
            }
            if let Some(v) = section.get("timeout_secs") {
                config.default_timeout = match v.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Duration::from_secs(secs),
                    _ => {
                        return Err(invalid("timeout_secs", v, "expected a positive integer"));
                    }
                };
            }
            if let Some(v) = section.get("user_agent") {
                let v = v.trim();
                if !v.is_empty() {
                    config.user_agent = v.to_string();
                }
            }
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> FetcherError {
    FetcherError::ConfigValue {
        key: format!("{}.{}", CONFIG_SECTION, key),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
