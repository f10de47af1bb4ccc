//! WinRM execution infrastructure.
//!
//! This module contains everything between the parsed plugin configuration
//! and the remote shell: session establishment with optional proxying,
//! payload encoding, and the retry-governed execution client. The wire
//! protocol itself sits behind the [`transport::ShellTransport`] trait so
//! the execution path can be exercised against scripted stubs.

pub mod client;
pub mod proxy;
pub mod retry;
pub mod script;
pub mod session;
pub mod transport;

pub use client::{Client, ExecuteOptions, ExecutionResult};
pub use proxy::{should_bypass_proxy, ProxySettings};
pub use retry::{run_with_retry, RetryPolicy};
pub use session::{AuthType, ConnectionParams, Session};
pub use transport::{CommandOutput, ShellTransport};
