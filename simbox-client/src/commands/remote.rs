//! Headless remote command execution

use simbox_core::AppContext;
use simbox_utils::Result;

pub async fn exec(ctx: &AppContext, command: &str, args: &[String]) -> Result<i32> {
    ctx.connect_terminals().await?;
    let result = ctx.terminals().exec(command, args).await;

    if result.is_success() {
        println!("{}", result.output);
    } else {
        eprintln!("{}", result.output);
    }
    Ok(result.exit_code)
}

pub async fn spawn(ctx: &AppContext, command: &str, args: &[String]) -> Result<i32> {
    ctx.connect_terminals().await?;
    let result = ctx.terminals().spawn(command, args).await;

    if !result.is_success() {
        eprintln!("{}", result.output);
    }
    Ok(result.exit_code)
}
