//! Filesystem commands over the cached remote tree

use std::io::{Read, Write};

use simbox_core::{AppContext, EntryType, SyncEvent};
use simbox_utils::{Result, SimboxError};
use tokio::sync::broadcast::error::TryRecvError;

pub async fn ls(ctx: &AppContext, path: &str) -> Result<i32> {
    let vfs = ctx.vfs();
    let names = vfs.list_directory(path).await?;
    let base = path.trim_matches('/');

    for name in names {
        let child = if base.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", base, name)
        };
        match vfs.entry_type(&child) {
            Some(EntryType::Directory) => println!("{}/", name),
            _ => println!("{}", name),
        }
    }
    Ok(0)
}

pub async fn cat(ctx: &AppContext, path: &str) -> Result<i32> {
    let data = ctx.vfs().read(path).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(0)
}

pub async fn write(ctx: &AppContext, path: &str, content: Option<String>) -> Result<i32> {
    let data = match content {
        Some(text) => text.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let mut events = ctx.sync().subscribe();
    ctx.vfs().write(path, &data).await?;
    settle(ctx, &mut events).await
}

pub async fn mkdir(ctx: &AppContext, path: &str, parents: bool) -> Result<i32> {
    let mut events = ctx.sync().subscribe();
    ctx.vfs().make_directory(path, parents).await?;
    settle(ctx, &mut events).await
}

pub async fn hydrate(ctx: &AppContext, prefix: &str) -> Result<i32> {
    let loaded = ctx.vfs().hydrate(prefix).await?;
    for path in ctx.vfs().snapshot().keys() {
        println!("{}", path);
    }
    eprintln!("{} file(s) loaded", loaded);
    Ok(0)
}

/// Retry anything the command left queued and report what was lost
async fn settle(
    ctx: &AppContext,
    events: &mut tokio::sync::broadcast::Receiver<SyncEvent>,
) -> Result<i32> {
    if ctx.sync().is_empty() {
        return Ok(0);
    }

    eprintln!("Remote store unavailable, retrying...");
    ctx.flush_pending().await;

    let mut abandoned = Vec::new();
    loop {
        match events.try_recv() {
            Ok(SyncEvent::Abandoned { path, error, .. }) => abandoned.push((path, error)),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    if abandoned.is_empty() {
        return Ok(0);
    }
    for (path, error) in &abandoned {
        eprintln!("Not persisted: {} ({})", path, error);
    }
    Err(SimboxError::remote(format!(
        "{} change(s) could not be persisted",
        abandoned.len()
    )))
}
