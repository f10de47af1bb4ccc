//! Plugin configuration from environment variables.
//!
//! CI systems hand settings to the plugin as `PLUGIN_*` environment
//! variables (proxy settings use the conventional `HTTP_PROXY` family).
//! The environment is read exactly once at startup into an immutable
//! [`Config`] that the rest of the crate receives by reference.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default WinRM HTTPS port
const DEFAULT_PORT: u16 = 5986;

/// Default connection timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of execution attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts in seconds
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Default working directory on the remote host.
pub const DEFAULT_WORKING_DIR: &str = "C:\\";

/// Complete plugin configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target hostname or IP address
    pub host: String,

    /// Target WinRM port
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Transport protocol, `http` or `https`
    pub protocol: String,

    /// Authentication mode selector (`ntlm` or `kerberos`)
    pub auth_type: String,

    /// Per-call network timeout
    pub timeout: Duration,

    /// Literal command to execute
    pub command: Option<String>,

    /// Path to a local script file to execute
    pub script_path: Option<String>,

    /// Inline script content to execute
    pub script_content: Option<String>,

    /// Remote working directory
    pub working_dir: String,

    /// Keep the session across requests (one session per process regardless)
    pub persist_session: bool,

    /// Stream output as it arrives (degrades to buffered capture)
    pub stream_output: bool,

    /// Maximum number of execution attempts
    pub max_retries: u32,

    /// Delay between attempts
    pub retry_interval: Duration,

    /// Log level passed to the logger
    pub log_level: String,

    /// Log format selector (`text` or `json`)
    pub log_format: String,

    /// Debug mode forces the log level to `debug`
    pub debug: bool,

    /// Proxy URL for plaintext transport
    pub http_proxy: Option<String>,

    /// Proxy URL for encrypted transport
    pub https_proxy: Option<String>,

    /// Comma-separated proxy bypass list
    pub no_proxy: Option<String>,
}

/// Execution payload source, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    /// A literal command line
    Command(&'a str),
    /// A local script file to read and execute
    ScriptFile(&'a str),
    /// Inline script content
    ScriptContent(&'a str),
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    ///
    /// Parsing is separated from `std::env` so tests can supply variables
    /// without mutating process-global state. Empty values are treated the
    /// same as absent ones; numeric values that fail to parse keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let required = |key: &str| {
            get(key).ok_or_else(|| Error::Config(format!("{} is required", key)))
        };

        let mut config = Config {
            host: required("PLUGIN_HOST")?,
            username: required("PLUGIN_USERNAME")?,
            password: required("PLUGIN_PASSWORD")?,
            port: DEFAULT_PORT,
            protocol: "https".to_string(),
            auth_type: "ntlm".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            command: get("PLUGIN_COMMAND"),
            script_path: get("PLUGIN_SCRIPT_PATH"),
            script_content: get("PLUGIN_SCRIPT_CONTENT"),
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            persist_session: false,
            stream_output: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            debug: false,
            http_proxy: get("HTTP_PROXY"),
            https_proxy: get("HTTPS_PROXY"),
            no_proxy: get("NO_PROXY"),
        };

        if let Some(port) = get("PLUGIN_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        if let Some(protocol) = get("PLUGIN_PROTOCOL") {
            config.protocol = protocol.to_lowercase();
        }

        if let Some(auth_type) = get("PLUGIN_AUTH_TYPE") {
            config.auth_type = auth_type.to_lowercase();
        }

        if let Some(timeout) = get("PLUGIN_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                config.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(working_dir) = get("PLUGIN_WORKING_DIR") {
            config.working_dir = working_dir;
        }

        if let Some(max_retries) = get("PLUGIN_MAX_RETRIES") {
            if let Ok(r) = max_retries.parse() {
                config.max_retries = r;
            }
        }

        if let Some(interval) = get("PLUGIN_RETRY_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                config.retry_interval = Duration::from_secs(secs);
            }
        }

        if let Some(level) = get("PLUGIN_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        if let Some(format) = get("PLUGIN_LOG_FORMAT") {
            config.log_format = format.to_lowercase();
        }

        if get("PLUGIN_DEBUG_MODE").as_deref() == Some("true") {
            config.debug = true;
            config.log_level = "debug".to_string();
        }

        if get("PLUGIN_PERSIST_SESSION").as_deref() == Some("true") {
            config.persist_session = true;
        }

        if get("PLUGIN_STREAM_OUTPUT").as_deref() == Some("true") {
            config.stream_output = true;
        }

        Ok(config)
    }

    /// Selects the execution payload, honoring precedence:
    /// command, then script path, then script content.
    pub fn payload(&self) -> Option<Payload<'_>> {
        if let Some(command) = self.command.as_deref() {
            Some(Payload::Command(command))
        } else if let Some(path) = self.script_path.as_deref() {
            Some(Payload::ScriptFile(path))
        } else {
            self.script_content.as_deref().map(Payload::ScriptContent)
        }
    }

    /// True when the endpoint uses TLS.
    pub fn use_tls(&self) -> bool {
        self.protocol == "https"
    }
}
