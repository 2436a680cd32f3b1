use anyhow::{bail, Context};
use sim_console::{ConsoleSettings, RunOutcome, SimulationRuntime};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,sim_console=info,persona_sim=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = ConsoleSettings::from_env().context("failed to load console settings")?;
    tracing::info!(base_url = %settings.base_url, name = %settings.name, "loaded settings");

    let runtime = SimulationRuntime::new(&settings, Box::new(std::io::stdout()))
        .context("failed to build simulation API client")?;
    runtime.spawn_interrupt_listener();

    match runtime.run().await {
        RunOutcome::Ended { results_url } => {
            tracing::info!(%results_url, "simulation finished");
            Ok(())
        }
        RunOutcome::Stopped => Ok(()),
        RunOutcome::StartFailed { reason } => bail!("simulation did not start: {reason}"),
        RunOutcome::Errored { reason } => bail!("simulation failed: {reason}"),
    }
}
