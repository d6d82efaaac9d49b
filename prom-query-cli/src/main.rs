mod pods;
mod query;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use prom_query::{ContextOptions, PromClient, PromConfig, QueryContext};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "prom-query")]
#[command(about = "Issue instant and range queries against a Prometheus compatible backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
pub(crate) struct ConnectionArgs {
    #[arg(long, global = true, help = "YAML configuration file")]
    config_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Backend base URL, overrides the configuration")]
    prometheus_url: Option<String>,
    #[arg(long, global = true, help = "Context name sent along with every query")]
    context_name: Option<String>,
    #[arg(long, global = true, help = "Evaluate instant queries this far in the past (e.g. 90s, 5m)")]
    query_offset: Option<String>,
}

impl ConnectionArgs {
    fn load_config(&self) -> Result<PromConfig> {
        let mut config = match &self.config_file {
            Some(path) => PromConfig::load(path)?,
            None => PromConfig::default().with_env_overrides(),
        };

        if let Some(url) = &self.prometheus_url {
            config.address = url.clone();
        }
        if let Some(name) = &self.context_name {
            config.context_name = Some(name.clone());
        }
        if let Some(offset) = &self.query_offset {
            config.query_offset = Some(offset.clone());
        }
        Ok(config)
    }

    pub(crate) fn context(&self) -> Result<QueryContext> {
        let config = self.load_config()?;
        let client = PromClient::from_config(&config)?;
        let options = ContextOptions::from_config(&config)?;
        Ok(QueryContext::with_options(client, options))
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one or more instant queries concurrently
    #[command(display_order = 1)]
    Query(query::QueryArgs),

    /// Run a range query
    #[command(display_order = 2)]
    Range(query::RangeArgs),

    /// Print the undecoded response body of a query
    #[command(display_order = 3)]
    Raw(query::RawArgs),

    /// Export pod labels, annotations and owners as Prometheus series
    #[command(display_order = 10)]
    PodLabels(pods::PodLabelsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query(args) => query::handle_query(&cli.connection, args).await,
        Commands::Range(args) => query::handle_range(&cli.connection, args).await,
        Commands::Raw(args) => query::handle_raw(&cli.connection, args).await,
        Commands::PodLabels(args) => pods::handle(args).await,
    }
}
