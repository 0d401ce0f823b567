use std::time::Duration;

use cx_throttle::costs::endpoint_key;
use cx_throttle::Throttler;
use cx_throttle::Ticket;
use tokio::time::Instant;
use tracing::info;

use crate::config_loader::SimConfig;

/// One admitted request of a simulated burst
#[derive(Debug, Clone)]
pub struct Admitted {
    pub endpoint: String,
    pub ticket: Ticket,
    pub waited: Duration,
}

/// Outcome of a simulated burst
#[derive(Debug, Clone)]
pub struct SimReport {
    pub admitted: Vec<Admitted>,
    pub total_cost: f64,
    pub elapsed: Duration,
}

impl SimReport {
    /// Cost units admitted per second over the whole run
    pub fn effective_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.total_cost / secs
    }
}

/// Fire every configured request back-to-back and await them in order
pub async fn run(config: &SimConfig) -> cx_throttle::Result<SimReport> {
    let throttler = Throttler::new(config.throttler.clone())?;
    let start = Instant::now();

    let mut pending = Vec::new();
    for request in &config.requests {
        let endpoint = endpoint_key(&request.method, &request.path);
        let cost = config.costs.cost(&endpoint, request.limit);
        for _ in 0..request.count {
            pending.push((endpoint.clone(), throttler.throttle(cost)?));
        }
    }

    info!(exchange = %config.exchange, requests = pending.len(), tokens = throttler.tokens(), "burst queued");

    let mut admitted = Vec::with_capacity(pending.len());
    let mut total_cost = 0.0;
    for (endpoint, admission) in pending {
        let ticket = admission.await?;
        let waited = start.elapsed();
        total_cost += ticket.cost;
        info!(
            seq = ticket.seq,
            endpoint = %endpoint,
            cost = ticket.cost,
            waited_ms = waited.as_millis() as u64,
            tokens = ticket.tokens_after,
            "admitted"
        );
        admitted.push(Admitted { endpoint, ticket, waited });
    }

    Ok(SimReport { admitted, total_cost, elapsed: start.elapsed() })
}
