use ampsim::config::Config;
use ampsim::sim::Simulator;
use anyhow::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    ampsim::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Ampsim EV charging station simulator {} starting up",
        env!("APP_VERSION")
    );

    let simulator = Simulator::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to build simulator: {}", e))?;

    match simulator.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Simulator failed with error: {}", e);
            Err(anyhow::anyhow!("Simulator error: {}", e))
        }
    }
}
