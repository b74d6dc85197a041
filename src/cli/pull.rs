//! Model download and removal commands

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::cli::Context;
use crate::core::stream_parser::PullProgress;
use crate::core::transport::TransportError;

pub async fn pull_model(context: &Context, name: &str) -> Result<(), Box<dyn Error>> {
    let client = context.client()?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("⬇️  Pulling {name} from {}", client.endpoint());
    let result = client
        .pull(
            name,
            |progress| {
                print!("\r\x1b[2K{}", progress_line(progress));
                let _ = io::stdout().flush();
            },
            &cancel,
        )
        .await;
    watcher.abort();
    println!();

    match result {
        Ok(true) => {
            println!("✅ {name} is ready");
            Ok(())
        }
        Ok(false) => Err(format!("❌ Pull of {name} did not complete").into()),
        Err(TransportError::Cancelled) => {
            println!("⏹️  Pull cancelled");
            Ok(())
        }
        Err(err) => Err(format!("❌ Pull of {name} failed ({}): {err}", err.classification()).into()),
    }
}

pub async fn delete_models(context: &Context, names: &[String]) -> Result<(), Box<dyn Error>> {
    let client = context.client()?;
    let mut failures = 0;
    for name in names {
        match client.delete(name).await {
            Ok(true) => println!("🗑️  Deleted {name}"),
            Ok(false) => {
                failures += 1;
                eprintln!("⚠️  {name} is not installed");
            }
            Err(err) => {
                failures += 1;
                eprintln!("❌ Could not delete {name}: {err}");
            }
        }
    }
    if failures > 0 {
        return Err(format!("{failures} of {} deletions failed", names.len()).into());
    }
    Ok(())
}

pub(crate) fn progress_line(progress: &PullProgress) -> String {
    match progress.percentage() {
        Some(percent) => format!("{} {percent:>3}%", progress.stage_label()),
        None => progress.stage_label(),
    }
}
