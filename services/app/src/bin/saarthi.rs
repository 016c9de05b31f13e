//! services/app/src/bin/saarthi.rs

use app_lib::{
    config::Config,
    error::AppError,
    screens::{self, auth, chat, daily, journey, state::AppState, thought},
};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "saarthi")]
#[command(about = "Spiritual guidance from the Bhagavad Gita, in your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk Krishna's Path: pick an emotion, draw a slip, read the verse
    Journey,
    /// Chat with the AI guide (requires sign in)
    Chat,
    /// Show the thought of the day
    Thought {
        /// Keep running and print each new thought
        #[arg(long)]
        watch: bool,
    },
    /// Show today's wisdom card
    DailyCard {
        /// Replace today's card with a fresh draw
        #[arg(long)]
        new: bool,
    },
    /// Sign in and remember the session
    Login {
        username: String,
        #[arg(long, env = "SAARTHI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        username: String,
        name: String,
        #[arg(long, env = "SAARTHI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "command failed");
        eprintln!("saarthi: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!(api = %config.api_base_url, "configuration loaded");

    // --- 2. Wire Adapters into the Shared State ---
    let state = AppState::from_config(config)?;
    let mut console = screens::stdio();

    // --- 3. Run the Requested Screen ---
    match cli.command {
        Command::Journey => journey::run(&state, &mut console).await,
        Command::Chat => chat::run(&state, &mut console).await,
        Command::Thought { watch } => thought::run(&state, &mut console, watch).await,
        Command::DailyCard { new } => daily::run(&state, &mut console, new).await,
        Command::Login { username, password } => {
            auth::run_login(&state, &mut console, &username, password).await
        }
        Command::Register {
            username,
            name,
            password,
        } => auth::run_register(&state, &mut console, &username, &name, password).await,
        Command::Logout => auth::run_logout(&state, &mut console).await,
        Command::Whoami => auth::run_whoami(&state, &mut console).await,
    }
}
