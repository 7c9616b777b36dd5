use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

use friendmatch_lib::{
    logging, AppConfig, InferenceClient, Matchmaker, SqliteStore, WebSocketBackend,
};

/// Profile generation and best-friend matching.
#[derive(Parser, Debug)]
#[command(name = "friendmatch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new user and print it
    Register {
        name: String,

        /// Avatar reference (URL or asset id)
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Send a message; use the service bot id as <TO> to ask a question
    Say { from: String, to: String, text: String },

    /// Print a user with an up-to-date profile
    Profile { user_id: String },

    /// Generate and store a new match for a user
    Match { user_id: String },

    /// List a user's stored matches
    Matches { user_id: String },

    /// Print the conversation between two users, newest first
    Conversation { a: String, b: String },
}

fn print_json<T: Serialize>(value: &T) -> friendmatch_lib::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(friendmatch_lib::PipelineError::from)?;
    println!("{}", text);
    Ok(())
}

async fn run(cli: Cli) -> friendmatch_lib::Result<()> {
    let config = AppConfig::from_env()?;

    if let Some(dir) = config.log_dir.as_deref() {
        if let Err(e) = logging::init_logging(Some(dir)) {
            eprintln!("Failed to initialize file logging: {}", e);
        }
        match logging::cleanup_old_logs(dir) {
            Ok(0) => {}
            Ok(removed) => logging::log_store(None, &format!("Removed {} old log files", removed)),
            Err(e) => logging::log_error(None, &format!("Log cleanup failed: {}", e)),
        }
    } else if let Err(e) = logging::init_logging(None) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let store = SqliteStore::open(&config.database_path)?;
    let backend = WebSocketBackend::new(&config.websocket_uri, config.connect_timeout);
    let matchmaker = Matchmaker::new(store, InferenceClient::new(Arc::new(backend)), config.pipeline);

    match cli.command {
        Command::Register { name, avatar } => print_json(&matchmaker.register_user(&name, avatar.as_deref())?),
        Command::Say { from, to, text } => print_json(&matchmaker.send_message(&from, &to, &text)?),
        Command::Profile { user_id } => print_json(&matchmaker.user(&user_id).await?),
        Command::Match { user_id } => print_json(&matchmaker.generate_match(&user_id).await?),
        Command::Matches { user_id } => print_json(&matchmaker.matches(&user_id)?),
        Command::Conversation { a, b } => print_json(&matchmaker.conversation(&a, &b)?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::log_error(None, &e.to_string());
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
