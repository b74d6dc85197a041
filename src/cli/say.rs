//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::cli::Context;
use crate::core::transport::{ChunkSink, TransportError};

pub async fn run_say(
    context: &Context,
    prompt: Vec<String>,
    model: Option<String>,
    hide_thinking: bool,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: shama say <prompt>".into());
    }
    let model = context
        .resolve_model(model)
        .ok_or("No model given. Pass -m MODEL or run 'shama config set default_model <name>'.")?;
    context.validator.validate_message(&prompt)?;

    let client = context.client()?;
    let hide_thinking = hide_thinking || context.settings.hide_thinking;
    let messages = [ChatMessage {
        role: "user".to_string(),
        content: prompt,
    }];

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut print_chunk = |chunk: &str| {
        print!("{chunk}");
        let _ = io::stdout().flush();
    };
    let sink: &mut ChunkSink<'_> = &mut print_chunk;
    let mut result = client
        .chat(&model, &messages, Some(sink), hide_thinking, &cancel)
        .await;
    if matches!(&result, Ok(reply) if reply.trim().is_empty()) {
        result = client
            .chat(&model, &messages, None, hide_thinking, &cancel)
            .await;
        if let Ok(reply) = &result {
            print!("{reply}");
        }
    }
    watcher.abort();
    println!();

    match result {
        Ok(_) => Ok(()),
        Err(TransportError::Cancelled) => {
            eprintln!("⏹️  Cancelled");
            Ok(())
        }
        Err(err) => Err(format!("❌ Error ({}): {err}", err.classification()).into()),
    }
}
