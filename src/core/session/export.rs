use std::fmt::Write as _;
use std::path::Path;

use crate::core::message::local_timestamp;
use crate::core::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// The session object exactly as stored in the history document.
    Json,
    /// Markdown-flavoured plain text.
    Transcript,
}

impl ExportFormat {
    /// `.json` targets get the structured form, anything else a transcript.
    pub fn for_path(path: &Path) -> Self {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            ExportFormat::Json
        } else {
            ExportFormat::Transcript
        }
    }
}

pub fn render(session: &Session, format: ExportFormat) -> Result<Vec<u8>, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_vec_pretty(session),
        ExportFormat::Transcript => Ok(render_transcript(session).into_bytes()),
    }
}

fn render_transcript(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", session.title);
    let _ = writeln!(out, "Date: {}", local_timestamp::format(&session.timestamp));
    out.push('\n');
    for message in &session.messages {
        let _ = write!(out, "**{}**: {}\n\n", message.role.title(), message.content);
    }
    out
}
