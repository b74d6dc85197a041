//! Model listing and connectivity commands

use std::error::Error;

use crate::api::models::{format_size, model_info_report, tag_report, ModelDescriptor};
use crate::cli::Context;

pub async fn show_status(context: &Context) -> Result<(), Box<dyn Error>> {
    let client = context.client()?;
    if client.probe().await {
        println!("✅ Connected to {}", client.endpoint());
        Ok(())
    } else {
        Err(format!(
            "❌ Cannot reach {}. Is the Ollama server running?",
            client.endpoint()
        )
        .into())
    }
}

pub async fn list_models(context: &Context, info: bool) -> Result<(), Box<dyn Error>> {
    let client = context.client()?;
    let models = client.list_models().await?;

    println!("🤖 Models on {}", client.endpoint());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(default_model) = &context.settings.default_model {
        println!("🎯 Default model: {default_model} (from config)");
        println!();
    }

    if models.is_empty() {
        println!("No models installed. Try 'shama pull llama2'.");
        return Ok(());
    }

    println!("Found {} models (sorted newest first):", models.len());
    println!();
    if info {
        let all: Vec<&ModelDescriptor> = models.iter().collect();
        println!("{}", model_info_report(&all));
        println!("Variants:");
        print!("{}", tag_report(&all, &models));
    } else {
        for model in &models {
            println!("{}", listing_line(model));
        }
    }
    Ok(())
}

fn listing_line(model: &ModelDescriptor) -> String {
    format!(
        "  • {:<40} {:>10}  {}",
        model.name,
        format_size(model.size),
        model.modified_date()
    )
}
