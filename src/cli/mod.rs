//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod history;
pub mod model_list;
pub mod pull;
pub mod say;
pub mod settings;


use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::core::config::{ConfigStore, Paths, Settings};
use crate::core::endpoint::Endpoint;
use crate::core::security_log::SecurityLog;
use crate::core::session::{SessionStore, StoreError};
use crate::core::transport::OllamaClient;
use crate::core::validator::{ValidationError, Validator};

#[derive(Parser)]
#[command(name = "shama", version)]
#[command(about = "Chat with and manage models on an Ollama server")]
#[command(
    long_about = "Shama talks to a local or remote Ollama server: list, pull and delete models, \
send one-shot prompts, or hold an interactive conversation that is saved to a local history.\n\n\
Environment Variables:\n\
  SHAMA_DATA_DIR    Directory for history, exports and the security log\n\
  RUST_LOG          Diagnostic log filter (default: warn)\n\n\
Chat commands:\n\
  /new              Start a new session (the current one is autosaved)\n\
  /save [title]     Save the current session\n\
  /load <n>         Reopen saved session n\n\
  /export <file>    Export the current session\n\
  /model <name>     Switch models\n\
  /thinking on|off  Hide or show reasoning\n\
  /quit             Leave (Ctrl+C cancels a reply in progress)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server address, overriding the configured one for this run
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// Storage directory for history, exports and the security log
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print diagnostic logs to stderr (repeat for more detail)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether the server is reachable
    Status,
    /// List installed models
    Models {
        /// Show sizes, digests and variants
        #[arg(long)]
        info: bool,
    },
    /// Download a model
    Pull {
        /// Model name, e.g. llama2:7b
        name: String,
    },
    /// Delete installed models
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Send one prompt and print the reply
    Say {
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,
        /// Hide reasoning in the reply
        #[arg(long)]
        hide_thinking: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Start an interactive chat (default)
    Chat {
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,
        /// Hide reasoning in replies
        #[arg(long)]
        hide_thinking: bool,
    },
    /// Inspect or manage saved sessions
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show rejected input and other security events
    SecurityLog {
        /// Delete the log instead of printing it
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List saved sessions
    List,
    /// Print a saved session
    Show { index: usize },
    /// Write a saved session to a file under the exports directory
    Export { index: usize, file: String },
    /// Delete every saved session
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current settings and file locations
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
    /// Restore a configuration value to its default
    Unset { key: String },
}

/// Everything a command needs, resolved once from flags, environment and
/// the settings file.
pub struct Context {
    pub paths: Paths,
    pub config: ConfigStore,
    pub settings: Settings,
    pub validator: Arc<Validator>,
    url_override: Option<String>,
}

impl Context {
    pub fn load(args: &Args) -> Result<Self, Box<dyn Error>> {
        let paths = Paths::resolve(args.config.clone(), args.data_dir.clone())?;
        let config = ConfigStore::new(paths.config_file.clone());
        let settings = config.load()?;
        let validator = Arc::new(Validator::new(
            paths.data_dir.clone(),
            SecurityLog::new(paths.security_log_file()),
        ));
        Ok(Context {
            paths,
            config,
            settings,
            validator,
            url_override: args.url.clone(),
        })
    }

    pub fn endpoint(&self) -> Result<Endpoint, ValidationError> {
        let url = self
            .url_override
            .as_deref()
            .unwrap_or(&self.settings.ollama_url);
        Endpoint::parse(url, &self.validator)
    }

    pub fn client(&self) -> Result<OllamaClient, Box<dyn Error>> {
        Ok(OllamaClient::new(self.endpoint()?, self.validator.clone()))
    }

    pub fn open_sessions(&self) -> Result<SessionStore, StoreError> {
        SessionStore::open(
            self.paths.history_file(),
            self.validator.clone(),
            self.settings.store_settings(),
        )
    }

    /// The `-m` flag wins over the configured default.
    pub fn resolve_model(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.settings.default_model.clone())
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);
    tokio::runtime::Runtime::new()?.block_on(handle_args(args))
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(format!("shama={default_level}"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn handle_args(args: Args) -> Result<(), Box<dyn Error>> {
    let context = Context::load(&args)?;

    match args.command.unwrap_or(Commands::Chat {
        model: None,
        hide_thinking: false,
    }) {
        Commands::Status => model_list::show_status(&context).await,
        Commands::Models { info } => model_list::list_models(&context, info).await,
        Commands::Pull { name } => pull::pull_model(&context, &name).await,
        Commands::Delete { names } => pull::delete_models(&context, &names).await,
        Commands::Say {
            model,
            hide_thinking,
            prompt,
        } => say::run_say(&context, prompt, model, hide_thinking).await,
        Commands::Chat {
            model,
            hide_thinking,
        } => chat::run_chat(&context, model, hide_thinking).await,
        Commands::History { command } => history::run_history(&context, command),
        Commands::Config { command } => settings::run_config(&context, command),
        Commands::SecurityLog { clear } => settings::run_security_log(&context, clear),
    }
}
