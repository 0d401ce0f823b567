use cx_throttle::Throttler;
use futures_util::Sink;
use futures_util::SinkExt;
use tracing::trace;

use crate::errors::SendError;

/// WebSocket-style sink whose sends are gated by a throttler
///
/// Wraps any [`Sink`], typically the write half of a WebSocket stream.
/// Each message waits for admission at `cost` before being forwarded, so
/// subscribe bursts never exceed the exchange's message rate.
pub struct ThrottledSink<S> {
    inner: S,
    throttler: Throttler,
    cost: f64,
}

impl<S> ThrottledSink<S> {
    /// Wrap `inner`, charging the throttler's default cost per message
    pub fn new(inner: S, throttler: Throttler) -> Self {
        let cost = throttler.config().cost;
        Self { inner, throttler, cost }
    }

    /// Charge `cost` per message instead of the default
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Send one message at the configured cost
    pub async fn send<Item>(&mut self, item: Item) -> Result<(), SendError<S::Error>>
    where
        S: Sink<Item> + Unpin,
    {
        let cost = self.cost;
        self.send_with_cost(item, cost).await
    }

    /// Send one message at an explicit cost
    pub async fn send_with_cost<Item>(&mut self, item: Item, cost: f64) -> Result<(), SendError<S::Error>>
    where
        S: Sink<Item> + Unpin,
    {
        let ticket = self.throttler.throttle(cost)?.await?;
        trace!(seq = ticket.seq, cost, "message admitted");
        self.inner.send(item).await.map_err(SendError::Sink)
    }
}
