//! Stevedore CLI - harness for the Bitbucket Cloud search connector.

mod config;
mod shutdown;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use stevedore::{BitbucketDataSource, Error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(version)]
#[command(about = "Bitbucket Cloud connector for search indexing")]
#[command(
    long_about = "Stevedore pulls repository, commit, pull-request and file metadata from \
the Bitbucket Cloud API and emits normalized documents for a search index."
)]
#[command(after_long_help = r#"EXAMPLES
    Check connectivity:
        $ stevedore ping

    Validate the configured repository list:
        $ stevedore validate

    Stream documents to stdout as NDJSON:
        $ stevedore sync > docs.ndjson

CONFIGURATION
    Stevedore reads configuration from:
      1. ~/.config/stevedore/config.toml (or $XDG_CONFIG_HOME/stevedore/config.toml)
      2. ./stevedore.toml
      3. Environment variables (STEVEDORE_* prefix)

ENVIRONMENT VARIABLES
    STEVEDORE_CONNECTOR__USERNAME        Bitbucket Cloud username
    STEVEDORE_CONNECTOR__APP_PASSWORD    Bitbucket Cloud app password
    STEVEDORE_CONNECTOR__RETRY_COUNT     Retries per request (default: 3)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check connectivity with the configured credentials
    Ping,
    /// Validate the configured repository list against accessible repositories
    Validate,
    /// Stream normalized documents to stdout as NDJSON
    Sync,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load();

    let connector = match config.connector() {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = shutdown::install();
    let source = match BitbucketDataSource::new(connector, cancel) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Ping => source.ping().await,
        Commands::Validate => match source.validate().await {
            Ok(()) => {
                println!("configuration OK");
                Ok(())
            }
            Err(e) => Err(e),
        },
        Commands::Sync => sync(&source).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            tracing::warn!("interrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn sync(source: &BitbucketDataSource) -> stevedore::Result<()> {
    let mut docs = source.get_docs();
    let mut emitted = 0usize;

    while let Some((document, _attachment)) = docs.try_next().await? {
        println!("{}", serde_json::Value::Object(document));
        emitted += 1;
    }

    tracing::info!("emitted {emitted} documents");
    Ok(())
}
