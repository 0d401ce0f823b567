use std::path::Path;

use config::Config;
use config::ConfigError;
use config::File;
use config::FileFormat;
use cx_throttle::exchanges;
use cx_throttle::CostRule;
use cx_throttle::EndpointCosts;
use cx_throttle::ThrottlerConfig;
use serde::Deserialize;

/// One group of identical requests to replay
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_count() -> usize {
    1
}

/// Endpoint cost as written in the config file
///
/// Listed as entries rather than a table keyed by endpoint so that paths
/// never have to survive key normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointCostEntry {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub by_limit: Vec<(u64, f64)>,
}

#[derive(Debug, Deserialize)]
pub struct SimConfigFile {
    pub exchange: Option<String>,
    pub throttler: Option<ThrottlerConfig>,
    pub default_cost: Option<f64>,
    #[serde(default)]
    pub endpoints: Vec<EndpointCostEntry>,
    #[serde(default)]
    pub requests: Vec<SimRequest>,
}

/// Fully resolved simulation setup
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub exchange: String,
    pub throttler: ThrottlerConfig,
    pub costs: EndpointCosts,
    pub requests: Vec<SimRequest>,
}

/// REST throttler preset and cost table for a known exchange
pub fn preset(exchange: &str) -> Option<(ThrottlerConfig, EndpointCosts)> {
    match exchange {
        "binance" => Some((exchanges::binance::spot_burst(), exchanges::binance::spot_costs())),
        "bybit" => Some((exchanges::bybit::public(), EndpointCosts::default())),
        "coinbase" => Some((exchanges::coinbase::public(), EndpointCosts::default())),
        "kraken" => Some((exchanges::kraken::private_starter(), exchanges::kraken::private_costs())),
        _ => None,
    }
}

/// Requests replayed when the config file lists none
pub fn default_requests() -> Vec<SimRequest> {
    vec![
        SimRequest { method: "GET".to_string(), path: "/api/v3/depth".to_string(), limit: Some(1000), count: 5 },
        SimRequest { method: "GET".to_string(), path: "/api/v3/exchangeInfo".to_string(), limit: None, count: 2 },
        SimRequest { method: "POST".to_string(), path: "/api/v3/order".to_string(), limit: None, count: 20 },
    ]
}

pub fn load_sim_config_file<P: AsRef<Path>>(path: P) -> Result<SimConfigFile, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;

    config.try_deserialize()
}

pub fn parse_sim_config_file(toml: &str) -> Result<SimConfigFile, ConfigError> {
    let config = Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build()?;

    config.try_deserialize()
}

/// Fill whatever the file leaves out from the exchange preset
pub fn resolve(file: SimConfigFile, exchange: &str) -> Result<SimConfig, ConfigError> {
    let exchange = file.exchange.unwrap_or_else(|| exchange.to_string());
    let preset = preset(&exchange);

    let throttler = match (file.throttler, &preset) {
        (Some(throttler), _) => throttler,
        (None, Some((throttler, _))) => throttler.clone(),
        (None, None) => return Err(ConfigError::Message(format!("no throttler configured and no preset for exchange '{exchange}'"))),
    };

    let costs = if file.endpoints.is_empty() && file.default_cost.is_none() {
        preset.map(|(_, costs)| costs).unwrap_or_default()
    } else {
        build_costs(file.default_cost, &file.endpoints)?
    };

    let requests = if file.requests.is_empty() { default_requests() } else { file.requests };

    Ok(SimConfig { exchange, throttler, costs, requests })
}

fn build_costs(default_cost: Option<f64>, entries: &[EndpointCostEntry]) -> Result<EndpointCosts, ConfigError> {
    let invalid = |err: cx_throttle::ThrottleError| ConfigError::Message(err.to_string());

    let mut costs = EndpointCosts::new(default_cost.unwrap_or(1.0)).map_err(invalid)?;
    for entry in entries {
        let cost = entry.cost.unwrap_or(costs.default_cost());
        let rule = if entry.by_limit.is_empty() { CostRule::Fixed(cost) } else { CostRule::ByLimit { cost, tiers: entry.by_limit.clone() } };
        costs.insert(cx_throttle::costs::endpoint_key(&entry.method, &entry.path), rule).map_err(invalid)?;
    }
    Ok(costs)
}

/// Load the simulation config, falling back to the exchange preset
pub fn load_sim_config_or_preset(path: &str, exchange: &str) -> Result<SimConfig, ConfigError> {
    match load_sim_config_file(path) {
        Ok(file) => {
            tracing::info!("Loaded simulation config from {path}");
            resolve(file, exchange)
        }
        Err(err) => {
            tracing::warn!("Failed to load simulation config from {}: {}. Using {} preset.", path, err, exchange);
            let empty = SimConfigFile { exchange: None, throttler: None, default_cost: None, endpoints: Vec::new(), requests: Vec::new() };
            resolve(empty, exchange)
        }
    }
}
