//! Session establishment against a WinRM endpoint.
//!
//! A [`Session`] is created once per process invocation and consumed by the
//! execution client; it is not designed for concurrent reuse.

use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::winrm::proxy::ProxySettings;
use crate::winrm::transport::{CommandOutput, Endpoint, HttpTransport, ShellTransport};

/// Supported authentication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Ntlm,
    Kerberos,
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ntlm" => Ok(AuthType::Ntlm),
            "kerberos" => Ok(AuthType::Kerberos),
            _ => Err(Error::UnsupportedAuth(s.to_string())),
        }
    }
}

/// Parameters for establishing one WinRM session.
///
/// Construction parses and validates the auth mode, so a
/// `ConnectionParams` value always carries a supported one.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub auth: AuthType,
    pub timeout: Duration,
    pub username: String,
    pub password: String,
}

impl ConnectionParams {
    /// Builds connection parameters from the plugin configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAuth`] for an auth mode outside the
    /// supported set, before any network activity.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            use_tls: config.use_tls(),
            auth: config.auth_type.parse()?,
            timeout: config.timeout,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

/// An established channel to a remote host, able to run command lines.
pub struct Session {
    transport: Box<dyn ShellTransport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Establishes a session for the given connection parameters.
    ///
    /// Resolves proxying for the target host and builds the HTTP
    /// transport. No remote call happens until the first command runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxyUrl`] for a malformed proxy URL and
    /// [`Error::SessionCreation`] when the transport cannot be built.
    pub fn connect(params: &ConnectionParams, proxy: &ProxySettings) -> Result<Self> {
        info!("Creating WinRM session for {}:{}", params.host, params.port);
        debug!("Auth type: {:?}", params.auth);

        let selected = if proxy.is_configured() {
            proxy.select(params.use_tls, &params.host)?
        } else {
            None
        };

        let endpoint = Endpoint {
            host: params.host.clone(),
            port: params.port,
            use_tls: params.use_tls,
            timeout: params.timeout,
        };

        let transport =
            HttpTransport::new(&endpoint, &params.username, &params.password, selected.as_ref())?;

        Ok(Self {
            transport: Box::new(transport),
        })
    }

    /// Wraps an existing transport as a session.
    pub fn from_transport(transport: Box<dyn ShellTransport>) -> Self {
        Self { transport }
    }

    /// Runs one command line in the remote shell.
    pub(crate) fn run(&self, command: &str) -> Result<CommandOutput> {
        self.transport.run(command)
    }
}
