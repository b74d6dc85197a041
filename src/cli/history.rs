//! Saved-session commands
//!
//! Sessions are numbered from 1 here and in the chat `/load` command.

use std::error::Error;

use crate::cli::{Context, HistoryCommands};
use crate::core::session::export::{render, ExportFormat};
use crate::core::session::{ExportSource, SessionSummary};

pub fn run_history(context: &Context, command: HistoryCommands) -> Result<(), Box<dyn Error>> {
    let mut store = context.open_sessions()?;
    match command {
        HistoryCommands::List => {
            let summaries = store.summaries();
            if summaries.is_empty() {
                println!("No saved sessions.");
            }
            for summary in &summaries {
                println!("{}", summary_line(summary));
            }
        }
        HistoryCommands::Show { index } => {
            let session = store
                .history()
                .get(to_position(index)?)
                .ok_or_else(|| format!("No saved session #{index}"))?;
            let transcript = render(session, ExportFormat::Transcript)?;
            print!("{}", String::from_utf8_lossy(&transcript));
        }
        HistoryCommands::Export { index, file } => {
            let path = store.export(&file, ExportSource::History(to_position(index)?))?;
            println!("📤 Exported session #{index} to {}", path.display());
        }
        HistoryCommands::Clear => {
            let count = store.history().len();
            store.clear()?;
            println!("🧹 Removed {count} saved sessions");
        }
    }
    Ok(())
}

pub(crate) fn summary_line(summary: &SessionSummary) -> String {
    format!(
        "{:>3}. {} ({}, {} messages)",
        summary.index + 1,
        summary.title,
        summary.date,
        summary.message_count
    )
}

fn to_position(index: usize) -> Result<usize, String> {
    index
        .checked_sub(1)
        .ok_or_else(|| "Sessions are numbered from 1".to_string())
}
