//! Retry-governed command and script execution.
//!
//! The client normalizes each request into a single command line (encoding
//! scripts, prefixing the working directory), then drives the session with
//! bounded retries. Only transport failures retry; a remote command that
//! ran and exited nonzero is reported as a normal result.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::winrm::retry::{run_with_retry, RetryPolicy};
use crate::winrm::script;
use crate::winrm::session::Session;

/// Options for one execution request.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Remote working directory; `None` or the platform root leaves the
    /// payload unprefixed
    pub working_dir: Option<String>,

    /// Keep the session for subsequent requests (accepted for interface
    /// compatibility; this design creates one session per process)
    pub persist_session: bool,

    /// Stream output as it arrives; currently degrades to buffered capture
    pub stream_output: bool,
}

/// Result of one completed execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code of the remote command
    pub exit_code: i32,
    /// Buffered standard output
    pub stdout: String,
    /// Buffered standard error
    pub stderr: String,
}

impl ExecutionResult {
    /// Returns true if the remote command exited with code zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// WinRM execution client.
pub struct Client {
    session: Session,
    retry: RetryPolicy,
}

impl Client {
    /// Creates a client driving `session` under `retry`.
    pub fn new(session: Session, retry: RetryPolicy) -> Self {
        Self { session, retry }
    }

    /// Executes a PowerShell command line.
    pub fn execute_command(&self, command: &str, opts: &ExecuteOptions) -> Result<ExecutionResult> {
        debug!("Executing command: {}", command);
        self.execute_internal(command, opts)
    }

    /// Executes PowerShell script content.
    ///
    /// The content is passed as an encoded command so multi-line scripts
    /// and special characters survive the trip through the remote shell.
    pub fn execute_script(&self, content: &str, opts: &ExecuteOptions) -> Result<ExecutionResult> {
        debug!("Executing script content ({} characters)", content.len());
        let command = script::powershell_invocation(content);
        self.execute_internal(&command, opts)
    }

    /// Executes a PowerShell script from a local file.
    ///
    /// # Errors
    ///
    /// Fails with an IO error before any remote call if the file is
    /// missing or unreadable.
    pub fn execute_script_file(&self, path: &str, opts: &ExecuteOptions) -> Result<ExecutionResult> {
        debug!("Executing script file: {}", path);

        let content = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read script file '{}': {}", path, e),
            ))
        })?;

        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if ext.as_deref() != Some("ps1") {
            warn!("Script file '{}' does not have .ps1 extension", path);
        }

        self.execute_script(&content, opts)
    }

    fn execute_internal(&self, command: &str, opts: &ExecuteOptions) -> Result<ExecutionResult> {
        if opts.stream_output {
            warn!("Streaming output not implemented, using buffered mode");
        }

        let working_dir = opts.working_dir.as_deref().unwrap_or("");
        let full_command = script::compose(command, working_dir);

        let output = run_with_retry(
            &self.retry,
            || self.session.run(&full_command),
            "command execution",
        )?;

        debug!("Execution completed with exit code: {}", output.exit_code);

        Ok(ExecutionResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
