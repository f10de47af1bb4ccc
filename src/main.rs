use anyhow::Context;
use log::{debug, error, info, warn};

use winrm_exec::config::{Config, Payload};
use winrm_exec::winrm::{
    Client, ConnectionParams, ExecuteOptions, ExecutionResult, ProxySettings, RetryPolicy, Session,
};

fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    info!("Starting WinRM plugin");
    debug!(
        "Configuration: Host={}, Port={}, Protocol={}, AuthType={}",
        config.host, config.port, config.protocol, config.auth_type
    );
    if config.log_format == "json" {
        warn!("JSON log format is not supported, using text");
    }

    match run(&config) {
        Ok(result) => {
            info!("Execution completed. Exit code: {}", result.exit_code);
            if !result.stdout.is_empty() {
                print!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr);
            }
            std::process::exit(result.exit_code);
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: &Config) -> anyhow::Result<ExecutionResult> {
    let params = ConnectionParams::from_config(config)?;
    let proxy = ProxySettings {
        http_proxy: config.http_proxy.clone(),
        https_proxy: config.https_proxy.clone(),
        no_proxy: config.no_proxy.clone(),
    };

    let session = Session::connect(&params, &proxy).context("failed to create WinRM session")?;
    let client = Client::new(
        session,
        RetryPolicy::new(config.max_retries, config.retry_interval),
    );

    let opts = ExecuteOptions {
        working_dir: Some(config.working_dir.clone()),
        persist_session: config.persist_session,
        stream_output: config.stream_output,
    };

    let result = match config.payload() {
        Some(Payload::Command(command)) => client.execute_command(command, &opts)?,
        Some(Payload::ScriptFile(path)) => client.execute_script_file(path, &opts)?,
        Some(Payload::ScriptContent(content)) => client.execute_script(content, &opts)?,
        None => anyhow::bail!(
            "no command, script file, or script content specified; \
             use PLUGIN_COMMAND, PLUGIN_SCRIPT_PATH, or PLUGIN_SCRIPT_CONTENT"
        ),
    };

    Ok(result)
}
