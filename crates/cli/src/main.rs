//! Shopkeep CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! sk-cli migrate
//!
//! # Load the sample catalog (or your own YAML file)
//! sk-cli seed
//! sk-cli seed --file products.yaml
//!
//! # Grant or revoke admin access
//! sk-cli user promote --email admin@example.com
//! sk-cli user demote --email admin@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sk-cli")]
#[command(author, version, about = "Shopkeep CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Insert sample products (skips names that already exist)
    Seed {
        /// YAML product list; defaults to the bundled sample catalog
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Manage user roles
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Give a user admin access
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Remove a user's admin access
    Demote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::products(file.as_deref()).await?,
        Commands::User { action } => match action {
            UserAction::Promote { email } => {
                commands::user::set_role(&email, shopkeep_core::Role::Admin).await?;
            }
            UserAction::Demote { email } => {
                commands::user::set_role(&email, shopkeep_core::Role::Normal).await?;
            }
        },
    }
    Ok(())
}
