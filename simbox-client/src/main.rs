//! simbox client
//!
//! One-shot filesystem and command operations against a remote sandbox,
//! plus an interactive remote shell.

use simbox_core::{AppConfig, AppContext, ConfigLoader};
use simbox_utils::{init_logging_with_config, LogConfig, Result};

mod cli;
mod commands;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // A raw-mode shell must not have log lines written over it
    let log_config = if args.is_interactive() {
        LogConfig::interactive()
    } else if args.verbose {
        LogConfig::development()
    } else {
        LogConfig::client()
    };
    init_logging_with_config(log_config)?;
    tracing::debug!("CLI args: {:?}", args);

    let code = exit_code(run(args).await);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Print a failed run once on stderr and map it to a process exit code
fn exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("simbox error: {}", e);
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    args.apply_overrides(&mut config);
    ConfigLoader::validate(&config)?;
    Ok(config)
}

async fn run(args: Args) -> Result<i32> {
    let config = load_config(&args)?;
    let ctx = AppContext::new(config)?;

    let result = commands::run(&ctx, args.command).await;
    ctx.shutdown().await;
    result
}
