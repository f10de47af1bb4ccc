//! WinRM command-execution plugin for CI pipelines.
//!
//! The plugin reads its settings from `PLUGIN_*` environment variables,
//! establishes a WinRM session against the target host, runs a single
//! command or PowerShell script with bounded retries, and reports the
//! captured output and exit code. It is invoked once per pipeline step,
//! not as a long-running service.

pub mod config;
pub mod error;
pub mod winrm;
