//! CLI module for pricegraph.
//!
//! Subcommands:
//! - `init`: Declare the schema of every entity kind
//! - `run`: Publish active instructions and reconcile observations
//! - `search`: Paginated product search

mod init;
mod run;
mod search;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;

/// pricegraph - product and price history graph
#[derive(Parser)]
#[command(name = "pricegraph")]
#[command(about = "Reconciles scraped product prices into a graph store")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Declare indexed predicates for every entity kind
    Init,

    /// Start the observation worker and publish active instructions
    Run,

    /// Search products by name
    Search {
        /// Case-insensitive substring of the product name
        term: String,

        /// Language the name is matched in
        #[arg(short, long, default_value = crate::models::DEFAULT_LANGUAGE)]
        language: String,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Products per page
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        let config = Config::load()?;
        tracing::debug!(environment = ?config.environment, "configuration loaded");

        let cancel = CancellationToken::new();
        let ctx = Context::connect(config, cancel.clone()).await?;

        match self.command {
            Command::Init => self.run_init(&ctx).await,
            Command::Run => self.run_worker(&ctx, cancel).await,
            Command::Search {
                ref term,
                ref language,
                page,
                size,
            } => self.run_search(&ctx, term, language, page, size).await,
        }
    }
}
