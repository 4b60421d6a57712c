//! Subcommand implementations
//!
//! Each command returns the process exit code.

mod fs;
mod remote;
mod shell;

use simbox_core::AppContext;
use simbox_utils::Result;

use crate::cli::Command;

pub async fn run(ctx: &AppContext, command: Command) -> Result<i32> {
    match command {
        Command::Ls { path } => fs::ls(ctx, &path).await,
        Command::Cat { path } => fs::cat(ctx, &path).await,
        Command::Write { path, content } => fs::write(ctx, &path, content).await,
        Command::Mkdir { path, parents } => fs::mkdir(ctx, &path, parents).await,
        Command::Hydrate { prefix } => fs::hydrate(ctx, &prefix).await,
        Command::Exec { command, args } => remote::exec(ctx, &command, &args).await,
        Command::Spawn { command, args } => remote::spawn(ctx, &command, &args).await,
        Command::Shell => shell::run(ctx).await,
    }
}
