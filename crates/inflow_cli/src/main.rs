//! Inflow CLI - operational interface for the sync engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::limits::OutputFormat;

#[derive(Parser)]
#[command(name = "inflow")]
#[command(version)]
#[command(about = "Resumable multi-tenant GraphQL ingestion")]
#[command(
    long_about = "Inflow syncs issues from an upstream GraphQL API into a local database, \
one scope (tenant/installation) at a time. Runs are resumable: an interrupted \
sync picks up from its last checkpoint instead of starting over, and per-scope \
API budgets are tracked so one tenant never starves another."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync issues for two repositories:
        $ inflow sync --scope 3fa85f64-5717-4562-b3fc-2c963f66afa6 octo/hello octo/world

    Check the remaining API budget for a scope:
        $ inflow limits --scope 3fa85f64-5717-4562-b3fc-2c963f66afa6

    Apply pending database migrations:
        $ inflow migrate up

CONFIGURATION
    Inflow reads configuration from:
      1. ~/.config/inflow/config.toml (or $XDG_CONFIG_HOME/inflow/config.toml)
      2. ./inflow.toml
      3. Environment variables (INFLOW_* prefix)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    INFLOW_DATABASE_URL     Database connection string (default: ~/.local/state/inflow/inflow.db)
    INFLOW_API_ENDPOINT     GraphQL endpoint URL (default: https://api.github.com/graphql)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync issues for one or more repositories
    Sync {
        /// Scope (installation) to sync under
        #[arg(short, long)]
        scope: Uuid,

        /// Repositories in owner/name form
        #[arg(required = true)]
        repos: Vec<String>,

        /// Items per page (default from config or 50)
        #[arg(short, long)]
        page_size: Option<u32>,

        /// Maximum pages per repository per run
        #[arg(short, long)]
        max_pages: Option<u32>,

        /// Don't prune issues missing upstream after a complete pass
        #[arg(long)]
        no_prune: bool,
    },
    /// Show the current API budget for a scope
    Limits {
        /// Scope (installation) to query
        #[arg(short, long)]
        scope: Uuid,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cancel = shutdown::setup_shutdown_handler();

    // Structured logging only when not talking to a person.
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("inflow=info,inflow_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();
    let cli = Cli::parse();

    match cli.command {
        Commands::Limits { scope, output } => {
            // No database needed for a budget probe.
            commands::limits::handle_limits(scope, output, &config).await
        }
        Commands::Migrate { action } => {
            let db = inflow::connect(&config.database_url()?).await?;
            match action {
                MigrateAction::Up => commands::migrate::handle_up(&db).await,
                MigrateAction::Down => commands::migrate::handle_down(&db).await,
                MigrateAction::Status => commands::migrate::handle_status(&db).await,
            }
        }
        Commands::Sync {
            scope,
            repos,
            page_size,
            max_pages,
            no_prune,
        } => {
            let db = inflow::connect_and_migrate(&config.database_url()?).await?;
            commands::sync::handle_sync(
                commands::sync::SyncArgs {
                    scope,
                    repos,
                    page_size,
                    max_pages,
                    no_prune,
                },
                &config,
                &db,
                cancel,
            )
            .await
        }
    }
}
