use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docket_gateway::db::{self, DocumentRepo};
use docket_gateway::sessions::{SessionBackend, SqliteStateStore, StateStore};
use docket_gateway::{Config, Daemon, DocumentFilter};

/// Docket - guided document intake over WhatsApp
#[derive(Parser)]
#[command(name = "docket", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default)
    Serve,
    /// List stored documents for a user, most recent first
    Documents {
        /// Owner identifier (e.g. "whatsapp:+15551234567")
        #[arg(short, long)]
        user: String,
        /// Only show this document type (label or id)
        #[arg(short, long)]
        doc_type: Option<String>,
    },
    /// Reset a user's conversation to the greeting
    Reset {
        /// User identifier
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,docket_gateway=info",
        1 => "info,docket_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let port = cli.port.unwrap_or(config.server.port);
            tracing::info!(port, "starting docket gateway");

            let daemon = Daemon::new(config, port)?;
            daemon.run().await?;
            Ok(())
        }
        Command::Documents { user, doc_type } => list_documents(&config, &user, doc_type.as_deref()),
        Command::Reset { user } => reset_user(&config, &user).await,
    }
}

/// Print a user's stored documents
fn list_documents(config: &Config, user: &str, doc_type: Option<&str>) -> anyhow::Result<()> {
    let pool = db::init(&config.database_path)?;
    let repo = DocumentRepo::new(pool);

    let mut filter = DocumentFilter::owner(user);
    if let Some(wanted) = doc_type {
        let Some(kind) = config.menu.find_document(wanted) else {
            anyhow::bail!("unknown document type: {wanted}");
        };
        filter = filter.of_type(&kind);
    }

    let records = repo.list(&filter)?;
    if records.is_empty() {
        println!("No documents stored for {user}");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {:<16}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.doc_type.label,
            record.url
        );
    }

    Ok(())
}

/// Remove a user's persisted conversation state
async fn reset_user(config: &Config, user: &str) -> anyhow::Result<()> {
    if config.sessions.backend == SessionBackend::Memory {
        println!("Session state is held in memory by the running server; nothing persisted to reset");
        return Ok(());
    }

    let pool = db::init(&config.database_path)?;
    let store = SqliteStateStore::new(pool);
    store.remove(user).await?;

    println!("Reset conversation for {user}");
    Ok(())
}
