use ai_worker::{Worker, WorkerConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ai-worker")]
#[command(about = "Single-task AI worker for the MQTT task fabric", long_about = None)]
struct Args {
    /// Path to configuration file (YAML or TOML)
    #[arg(long)]
    config: Option<String>,

    /// Broker host (overrides MQTT_BROKER)
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port (overrides MQTT_PORT)
    #[arg(long)]
    broker_port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = WorkerConfig::load(args.config.as_deref())?;

    // Override with CLI args
    if let Some(host) = args.broker_host {
        config.broker.host = host;
    }
    if let Some(port) = args.broker_port {
        config.broker.port = port;
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.log_level.clone().into());
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    Worker::new(config).run().await?;

    Ok(())
}
