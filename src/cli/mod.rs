//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod ask;
pub mod exchange;
pub mod render;
pub mod repl;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::ask::run_ask;
use crate::cli::repl::run_repl;
use crate::core::config::data::{API_KEY_ENV, BASE_URL_ENV};
use crate::core::config::{path_display, Config, ConfigError};
use crate::core::session::ChatSession;
use crate::core::verifier::VerificationOutcome;
use crate::utils::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "driftchat")]
#[command(version)]
#[command(about = "Chat with a streaming completion endpoint from your terminal")]
#[command(
    long_about = "driftchat sends your messages to a chat completion endpoint and prints the \
reply as it streams in, optionally replaying it at a steady typewriter pace.\n\n\
Environment Variables:\n\
  DRIFTCHAT_API_KEY    API key sent with every request\n\
  DRIFTCHAT_BASE_URL   Chat service root (default http://localhost:8000)\n\
  RUST_LOG             Diagnostic log filter, written to stderr (default driftchat=warn)\n\n\
Commands inside the chat:\n\
  /key <api-key>    Set the API key\n\
  /verify           Check the API key\n\
  /system [text]    Show or replace the developer message\n\
  /clear            Clear the conversation\n\
  /help             List commands\n\
  /quit             Leave"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// API key for the chat service (overrides DRIFTCHAT_API_KEY)
    #[arg(short = 'k', long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model requested for every message
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Root URL of the chat service
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send a single prompt and print the reply
    Ask {
        /// The prompt to send (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Check the API key against the chat service
    Verify,
    /// Print the effective configuration
    Config,
}

impl Args {
    /// File config, then environment, then flags; later sources win.
    pub fn resolve_config<F>(&self, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load()?,
        };
        config.apply_env(&lookup);
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        Ok(config)
    }

    pub fn resolve_api_key<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup(API_KEY_ENV))
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = args.resolve_config(env_lookup)?;
    debug!(base_url = config.base_url(), model = config.model(), "Configuration resolved");

    match args.command.as_ref().unwrap_or(&Commands::Chat) {
        Commands::Config => {
            let path = match &args.config {
                Some(path) => path.clone(),
                None => Config::get_config_path()?,
            };
            println!("Config file: {}", path_display(&path));
            if std::env::var_os(BASE_URL_ENV).is_some() {
                println!("  ({BASE_URL_ENV} is set and overrides base-url)");
            }
            config.print_all();
            Ok(())
        }
        Commands::Verify => {
            let session = build_session(&args, &config)?;
            let outcome = session.verify().await;
            let state = session.verifier().state().snapshot();
            match outcome {
                VerificationOutcome::Verified => {
                    println!("✅ API key accepted by {}", config.base_url());
                    Ok(())
                }
                _ => {
                    eprintln!(
                        "❌ {}",
                        state.last_error.as_deref().unwrap_or("Verification failed.")
                    );
                    std::process::exit(1);
                }
            }
        }
        Commands::Ask { prompt } => {
            let session = build_session(&args, &config)?;
            run_ask(&session, &prompt.join(" ")).await
        }
        Commands::Chat => {
            let session = build_session(&args, &config)?;
            run_repl(&session, config.base_url()).await
        }
    }
}

fn build_session(args: &Args, config: &Config) -> Result<ChatSession, Box<dyn Error>> {
    let client = reqwest::Client::builder().build()?;
    Ok(ChatSession::from_config(
        config,
        client,
        &args.resolve_api_key(env_lookup),
    ))
}
