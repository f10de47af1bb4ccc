//! Proxy selection and bypass rules for WinRM endpoints.
//!
//! Proxies arrive through the conventional `HTTP_PROXY`/`HTTPS_PROXY`/
//! `NO_PROXY` variables. Bypass entries follow the common `NO_PROXY`
//! conventions: exact host, dot-prefixed domain suffix, or bare domain
//! suffix.

use log::debug;
use url::Url;

use crate::error::{Error, Result};

/// Proxy configuration for outbound WinRM connections.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    /// Proxy URL for plaintext endpoints
    pub http_proxy: Option<String>,

    /// Proxy URL for TLS endpoints
    pub https_proxy: Option<String>,

    /// Comma-separated bypass list
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    /// Returns true if any proxy URL is configured.
    pub fn is_configured(&self) -> bool {
        self.http_proxy.as_deref().is_some_and(|p| !p.is_empty())
            || self.https_proxy.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Picks the proxy to use for a connection to `host`.
    ///
    /// Returns `None` when no proxy applies: either nothing is configured
    /// for the endpoint's scheme, or the host matches the bypass list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxyUrl`] if the selected proxy URL does
    /// not parse.
    pub fn select(&self, use_tls: bool, host: &str) -> Result<Option<Url>> {
        let no_proxy = self.no_proxy.as_deref().unwrap_or("");
        if should_bypass_proxy(host, no_proxy) {
            debug!("Bypassing proxy for host: {}", host);
            return Ok(None);
        }

        let configured = if use_tls {
            self.https_proxy.as_deref()
        } else {
            self.http_proxy.as_deref()
        };

        match configured {
            Some(raw) if !raw.is_empty() => {
                let parsed = Url::parse(raw).map_err(|source| Error::InvalidProxyUrl {
                    url: raw.to_string(),
                    source,
                })?;
                debug!("Using proxy: {}", parsed);
                Ok(Some(parsed))
            }
            _ => Ok(None),
        }
    }
}

/// Checks whether `host` should skip the proxy according to a comma
/// separated bypass list.
///
/// An entry matches on exact equality, as a dot-prefixed suffix
/// (`.example.com`), or as a bare domain suffix (`example.com` covering
/// `build.example.com`). The first matching entry wins; an empty list
/// never bypasses.
pub fn should_bypass_proxy(host: &str, no_proxy: &str) -> bool {
    if no_proxy.is_empty() {
        return false;
    }

    for entry in no_proxy.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if host == entry {
            return true;
        }

        if entry.starts_with('.') && host.ends_with(entry) {
            return true;
        }

        if host.ends_with(&format!(".{}", entry)) {
            return true;
        }
    }

    false
}
