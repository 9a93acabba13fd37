use anyhow::Result;
use cashtag_crawler::config::{ApiCredentials, PipelineConfig, StoreCredentials};
use cashtag_crawler::connection::StreamConnector;
use cashtag_crawler::error::PipelineError;
use cashtag_crawler::pipeline::Pipeline;
use cashtag_crawler::settings::settings;
use cashtag_crawler::utils::{init_tracing, log_fatal, log_startup_config};
use clap::Parser;
use tokio::sync::watch;

/// Tracks a search term on the filtered stream and records cashtag co-mentions.
#[derive(Parser, Debug)]
#[command(name = "cashtag-crawler", version)]
struct Cli {
    /// Term to track upstream; also the graph source once normalized
    #[arg(long)]
    search_term: String,

    /// Queue for a downstream consumer (not used by the ingest path)
    #[arg(long)]
    sqs_queue_url: String,
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, PipelineError> {
    let api = ApiCredentials::from_env()?;
    let store = StoreCredentials::from_env();
    Ok(PipelineConfig::new(
        &cli.search_term,
        &cli.sqs_queue_url,
        api,
        store,
    )?)
}

async fn run(config: PipelineConfig, stop: watch::Receiver<bool>) -> Result<(), PipelineError> {
    let settings = settings();
    let connector = StreamConnector::new(settings, config.api.clone(), config.search_term())?;
    let pipeline = Pipeline::start(&config, settings, connector, stop).await?;
    pipeline.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            log_fatal(&e);
            std::process::exit(1);
        }
    };
    log_startup_config(
        config.search_term(),
        &config.edge_source(),
        config.queue_url(),
        &config.store.database_url,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    if let Err(e) = run(config, stop_rx).await {
        log_fatal(&e);
        std::process::exit(1);
    }

    Ok(())
}
