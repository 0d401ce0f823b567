use cx_app::cli;
use cx_app::config_loader;
use cx_app::simulation;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = cx_app::tracing_setup::init_with_stdout("cx_throttle_sim", "./logs", tracing::Level::INFO);

    let exchange = cli::get_exchange("binance");
    let config_path = cli::get_config_path("cx_throttle_sim.toml");

    info!("=== Throttler Simulation ===");

    let config = config_loader::load_sim_config_or_preset(&config_path, &exchange)?;

    info!("Configuration:");
    info!("  Exchange: {}", config.exchange);
    info!("  Refill rate: {:.4} tokens/ms ({:.1}/min)", config.throttler.refill_rate, config.throttler.refill_rate * 60_000.0);
    info!("  Max capacity: {:?}", config.throttler.max_capacity);
    info!("  Policy: {:?}", config.throttler.policy);
    info!("  Request groups: {}", config.requests.len());

    let report = simulation::run(&config).await?;

    info!("Admitted {} requests, {:.1} cost units in {:?}", report.admitted.len(), report.total_cost, report.elapsed);
    info!("Effective rate: {:.2} cost units/s", report.effective_rate());

    Ok(())
}
