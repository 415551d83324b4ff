use std::sync::Arc;

use clap::{Parser, Subcommand};
use perch::{
    cmd::{ReplayArgs, replay},
    config::AppConfig,
    ingest::{EventSource, NatsEventSource},
    persistence::JsonFileStateStore,
    stats::{NatsStatsPublisher, StatsPublisher},
    supervisor::Supervisor,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the notification gate.
    Run {
        /// Configuration directory. Defaults to `configs`.
        #[arg(short, long)]
        config_dir: Option<String>,
    },
    /// Replays recorded detections through the gate and prints the decisions.
    Replay(ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir } => run_supervisor(config_dir.as_deref()).await?,
        Commands::Replay(args) => replay::execute(args).await?,
    }

    Ok(())
}

async fn run_supervisor(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_dir)?;
    tracing::debug!(
        state_path = %config.state_path.display(),
        species_path = %config.species_path.display(),
        stations = config.stations.len(),
        "Configuration loaded."
    );

    let store = Arc::new(JsonFileStateStore::new(&config.state_path));
    let mut builder = Supervisor::builder().store(store);

    if let Some(nats) = &config.nats {
        tracing::debug!(urls = %nats.urls, "Connecting to NATS...");
        let client = NatsEventSource::connect(nats).await?;
        tracing::info!(urls = %nats.urls, "Connected to NATS.");

        for station in &config.stations {
            let source = NatsEventSource::new(client.clone(), station.clone());
            builder = builder.source(Arc::new(source) as Arc<dyn EventSource>);
        }

        if let Some(subject) = &nats.stats_subject {
            let publisher = NatsStatsPublisher::new(client.clone(), subject.clone());
            builder = builder.publisher(Arc::new(publisher) as Arc<dyn StatsPublisher>);
        }
    } else if !config.stations.is_empty() {
        tracing::warn!("Stations are configured but no NATS connection is, ignoring them.");
    }

    let supervisor = builder.config(config).build()?;

    tracing::info!("Supervisor initialized, starting the gate...");

    supervisor.run().await?;

    Ok(())
}
