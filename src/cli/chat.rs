//! Line-oriented interactive chat driven by the controller loop

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::Context;
use crate::core::controller::{Controller, SendOutcome, UiUpdate};
use crate::core::session::ExportSource;

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    New,
    Save(Option<String>),
    /// One-based index as shown by `history list`.
    Load(usize),
    Export(String),
    Model(String),
    Thinking(bool),
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Message(line.to_string());
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "new" => ChatInput::New,
        "save" if rest.is_empty() => ChatInput::Save(None),
        "save" => ChatInput::Save(Some(rest.to_string())),
        "load" => match rest.parse::<usize>() {
            Ok(index) if index > 0 => ChatInput::Load(index),
            _ => ChatInput::Invalid("Usage: /load <n> (see 'shama history list')".into()),
        },
        "export" if rest.is_empty() => ChatInput::Invalid("Usage: /export <file>".into()),
        "export" => ChatInput::Export(rest.to_string()),
        "model" if rest.is_empty() => ChatInput::Invalid("Usage: /model <name>".into()),
        "model" => ChatInput::Model(rest.to_string()),
        "thinking" => match crate::core::config::data::parse_bool(rest) {
            Some(show) => ChatInput::Thinking(show),
            None => ChatInput::Invalid("Usage: /thinking on|off".into()),
        },
        "help" => ChatInput::Help,
        "quit" | "exit" => ChatInput::Quit,
        other => ChatInput::Invalid(format!("Unknown command: /{other}")),
    }
}

pub async fn run_chat(
    context: &Context,
    model: Option<String>,
    hide_thinking: bool,
) -> Result<(), Box<dyn Error>> {
    let client = context.client()?;
    let store = context.open_sessions()?;
    let mut controller = Controller::new(
        client,
        store,
        hide_thinking || context.settings.hide_thinking,
    );
    if let Some(model) = context.resolve_model(model) {
        controller.set_model(&model)?;
    }

    println!("💬 Chatting with {}", controller.client().endpoint());
    match controller.current_model() {
        Some(model) => println!("   Model: {model}"),
        None => println!("   No model selected; use /model <name>"),
    }
    println!("   Type /help for commands, /quit to leave.");
    controller.refresh_models();
    controller.start_connectivity_monitor();

    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&mut controller, parse_chat_input(&line)) {
                    break;
                }
                if !controller.is_busy() {
                    prompt();
                }
            }
            Some(event) = controller.next_event() => {
                let update = controller.apply(event);
                if renderer.render(update) {
                    prompt();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if controller.cancel_chat() {
                    continue;
                }
                break;
            }
        }
    }

    println!();
    match controller.shutdown() {
        Ok(Some(index)) => println!("💾 Session saved as #{}", index + 1),
        Ok(None) => {}
        Err(err) => eprintln!("⚠️  Session could not be saved: {err}"),
    }
    Ok(())
}

/// Returns `false` when the user asked to leave.
fn handle_input(controller: &mut Controller, input: ChatInput) -> bool {
    match input {
        ChatInput::Message(text) if text.is_empty() => {}
        ChatInput::Message(text) => match controller.send_message(&text) {
            SendOutcome::Started | SendOutcome::Empty => {}
            SendOutcome::Busy => eprintln!("⏳ Still waiting for the last reply"),
            SendOutcome::NoModel => eprintln!("⚠️  Choose a model first: /model <name>"),
            SendOutcome::Rejected(err) => eprintln!("❌ Message rejected: {err}"),
        },
        ChatInput::New => match controller.store_mut().start_new_session() {
            Ok(Some(index)) => println!("💾 Saved as #{}; new session started", index + 1),
            Ok(None) => println!("🆕 New session started"),
            Err(err) => eprintln!("⚠️  New session started, but saving failed: {err}"),
        },
        ChatInput::Save(title) => match controller.store_mut().save(title.as_deref()) {
            Ok(index) => println!("💾 Saved as #{}", index + 1),
            Err(err) => eprintln!("❌ Save failed: {err}"),
        },
        ChatInput::Load(index) => match controller.store_mut().load(index - 1) {
            Ok(()) => println!(
                "📂 Loaded session #{index} ({} messages)",
                controller.store().current().len()
            ),
            Err(err) => eprintln!("❌ {err}"),
        },
        ChatInput::Export(file) => match controller.store().export(&file, ExportSource::Current) {
            Ok(path) => println!("📤 Exported to {}", path.display()),
            Err(err) => eprintln!("❌ Export failed: {err}"),
        },
        ChatInput::Model(name) => match controller.set_model(&name) {
            Ok(()) => println!("🤖 Using {name}"),
            Err(err) => eprintln!("❌ {err}"),
        },
        ChatInput::Thinking(show) => {
            controller.set_hide_thinking(!show);
            println!(
                "🧠 Reasoning will be {}",
                if show { "shown" } else { "hidden" }
            );
        }
        ChatInput::Help => print_help(),
        ChatInput::Quit => return false,
        ChatInput::Invalid(message) => eprintln!("⚠️  {message}"),
    }
    true
}

/// Turns controller updates into terminal output.
#[derive(Default)]
struct Renderer {
    /// Whether any part of the current reply has been printed.
    streamed: bool,
}

impl Renderer {
    /// Returns `true` when the exchange ended and the prompt should return.
    fn render(&mut self, update: UiUpdate) -> bool {
        match update {
            UiUpdate::ChatChunk(text) => {
                if !self.streamed {
                    print!("\n🤖 ");
                    self.streamed = true;
                }
                print!("{text}");
                let _ = io::stdout().flush();
                false
            }
            UiUpdate::RetryingWithoutStreaming => false,
            UiUpdate::ReplyCompleted { reply } => {
                if !self.streamed {
                    print!("\n🤖 {reply}");
                }
                println!();
                self.streamed = false;
                true
            }
            UiUpdate::EmptyReply => {
                eprintln!("\n⚠️  The model returned an empty reply");
                self.streamed = false;
                true
            }
            UiUpdate::ChatFailed(err) => {
                eprintln!("\n❌ {} ({})", err, err.classification());
                self.streamed = false;
                true
            }
            UiUpdate::Connectivity {
                reachable,
                changed: true,
            } => {
                if reachable {
                    eprintln!("\n🟢 Server reachable");
                } else {
                    eprintln!("\n🔴 Server unreachable; retrying every few seconds");
                }
                false
            }
            UiUpdate::ModelsUnavailable(err) => {
                eprintln!("\n⚠️  Could not list models: {err}");
                false
            }
            _ => false,
        }
    }
}

fn prompt() {
    print!("\n> ");
    let _ = io::stdout().flush();
}

fn print_help() {
    println!("Commands:");
    println!("  /new              Start a new session (autosaves the current one)");
    println!("  /save [title]     Save the current session");
    println!("  /load <n>         Reopen saved session n");
    println!("  /export <file>    Export the current session (.json for structured output)");
    println!("  /model <name>     Switch models");
    println!("  /thinking on|off  Show or hide reasoning");
    println!("  /quit             Leave");
    println!("Ctrl+C cancels a reply in progress.");
}
