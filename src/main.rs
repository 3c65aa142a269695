use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use chatty::config::Config;
use chatty::db::Database;
use chatty::{logging, runtime, session};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "chatty",
    version = VERSION,
    about = "The twitch.tv chat statistics bot"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<MainCommand>,
}

#[derive(Debug, Subcommand)]
enum MainCommand {
    /// Connect to chat and start tracking statistics
    Start,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(MainCommand::Start) {
        MainCommand::Version => {
            println!("chatty {VERSION}");
            Ok(())
        }
        MainCommand::Start => start().await,
    }
}

async fn start() -> anyhow::Result<()> {
    let config = Config::load()?;
    logging::init_console_logging();

    let db = Arc::new(Database::new(&config.data_dir)?);

    // Blocks on the operator's answer; the transport connects afterwards.
    let session_id = session::choose_session(db.clone()).await?;
    info!("Active session: {session_id}");

    runtime::run(config, db, session_id).await
}
