use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::AdmissionPolicy;
use crate::config::ThrottlerConfig;
use crate::error::Result;
use crate::error::ThrottleError;
use crate::time::duration_to_millis;
use crate::time::millis_to_duration;
use crate::time::Clock;
use crate::time::TokioClock;

/// Proof of admission handed to a caller once its entry leaves the queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticket {
    /// Enqueue sequence number (order of `throttle()` calls)
    pub seq: u64,

    /// Admission sequence number (order in which entries left the queue)
    pub admission: u64,

    /// Cost charged against the bucket
    pub cost: f64,

    /// Clock time of admission
    pub admitted_at: Duration,

    /// Token balance right after charging; negative means overdraft
    pub tokens_after: f64,
}

struct QueueEntry {
    seq: u64,
    cost: f64,
    resolver: oneshot::Sender<Ticket>,
}

struct State {
    queue: VecDeque<QueueEntry>,
    tokens: f64,
    last_timestamp: Duration,
    running: bool,
    next_seq: u64,
    admitted: u64,
}

struct Shared {
    config: ThrottlerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,

    /// Number of live drain loops; never above one
    active_drains: AtomicUsize,
}

/// FIFO token-bucket admission controller
///
/// One instance per exchange connection. Every gated call first awaits
/// `throttle(cost)`; entries leave the queue strictly in call order, no
/// faster than `refill_rate` allows. The queue is drained by a single tokio
/// task that exists only while there is something to drain.
///
/// Cloning is cheap and clones share the same bucket and queue.
#[derive(Clone)]
pub struct Throttler {
    shared: Arc<Shared>,
}

impl Throttler {
    /// Create a throttler driven by the tokio clock
    pub fn new(config: ThrottlerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(TokioClock::new()))
    }

    /// Create a throttler driven by a custom clock
    pub fn with_clock(config: ThrottlerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let state = State {
            queue: VecDeque::new(),
            tokens: config.starting_tokens(),
            last_timestamp: clock.now(),
            running: false,
            next_seq: 0,
            admitted: 0,
        };

        Ok(Self { shared: Arc::new(Shared { config, clock, state: Mutex::new(state), active_drains: AtomicUsize::new(0) }) })
    }

    /// Queue a request of the given cost
    ///
    /// The entry is enqueued before this returns, so the order of
    /// `throttle()` calls is the admission order regardless of when the
    /// returned futures are first polled. Dropping the [`Admission`] before
    /// it resolves withdraws the entry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn throttle(&self, cost: f64) -> Result<Admission> {
        let config = &self.shared.config;

        if !cost.is_finite() || cost < 0.0 {
            warn!(cost, "rejecting request with invalid cost");
            return Err(ThrottleError::InvalidCost(cost));
        }
        if let (AdmissionPolicy::FullCost, Some(capacity)) = (config.policy, config.max_capacity) {
            if cost > capacity {
                warn!(cost, capacity, "rejecting request that can never fit the bucket");
                return Err(ThrottleError::CostExceedsCapacity { cost, capacity });
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ThrottleError::NoRuntime)?;
        let (resolver, receiver) = oneshot::channel();

        let (seq, start_drain) = {
            let mut state = self.shared.state.lock();

            if let Some(max) = config.max_queue_len {
                if state.queue.len() >= max {
                    warn!(pending = state.queue.len(), "throttle queue is full");
                    return Err(ThrottleError::QueueFull(state.queue.len()));
                }
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push_back(QueueEntry { seq, cost, resolver });

            let start_drain = !state.running;
            state.running = true;
            (seq, start_drain)
        };

        if start_drain {
            runtime.spawn(drain(DrainGuard::new(Arc::clone(&self.shared))));
        }

        Ok(Admission { seq, receiver, shared: Arc::downgrade(&self.shared), completed: false })
    }

    /// Queue a request at the configured default cost
    pub fn throttle_default(&self) -> Result<Admission> {
        self.throttle(self.shared.config.cost)
    }

    /// Current token balance, including refill accrued since the last update
    pub fn tokens(&self) -> f64 {
        let state = self.shared.state.lock();
        let elapsed = self.shared.clock.now().saturating_sub(state.last_timestamp);
        self.shared.config.clamp(state.tokens + duration_to_millis(elapsed) * self.shared.config.refill_rate)
    }

    /// Number of entries waiting for admission
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether a drain loop is currently active
    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Configuration this throttler was built with
    pub fn config(&self) -> &ThrottlerConfig {
        &self.shared.config
    }

    /// Restore the starting balance. Pending entries stay queued.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.tokens = self.shared.config.starting_tokens();
        state.last_timestamp = self.shared.clock.now();
    }

    #[cfg(test)]
    pub(crate) fn drain_loops(&self) -> usize {
        self.shared.active_drains.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Throttler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Throttler")
            .field("config", &self.shared.config)
            .field("tokens", &state.tokens)
            .field("pending", &state.queue.len())
            .field("running", &state.running)
            .finish()
    }
}

impl Shared {
    fn refill(&self, state: &mut State, now: Duration) {
        let elapsed = now.saturating_sub(state.last_timestamp);
        if elapsed.is_zero() {
            return;
        }
        state.tokens = self.config.clamp(state.tokens + duration_to_millis(elapsed) * self.config.refill_rate);
        state.last_timestamp = now;
    }

    /// Admit everything currently admissible from the head of the queue
    ///
    /// Returns how long to sleep before the next attempt, or `None` once the
    /// queue is empty, in which case the loop has been marked idle.
    fn step(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.refill(&mut state, now);

        loop {
            let head_cost = match state.queue.front() {
                Some(head) => head.cost,
                None => {
                    state.running = false;
                    self.active_drains.fetch_sub(1, Ordering::AcqRel);
                    return None;
                }
            };

            let deficit = self.config.policy.deficit(state.tokens, head_cost);
            if deficit > 0.0 {
                let wait = millis_to_duration(deficit / self.config.refill_rate);
                return Some(wait.clamp(Duration::from_nanos(1), self.config.delay));
            }

            let Some(entry) = state.queue.pop_front() else { continue };
            state.tokens -= entry.cost;

            let ticket = Ticket { seq: entry.seq, admission: state.admitted, cost: entry.cost, admitted_at: now, tokens_after: state.tokens };

            // A receiver withdraws its entry under this lock before it is dropped
            let _ = entry.resolver.send(ticket);
            state.admitted += 1;
            trace!(seq = ticket.seq, cost = ticket.cost, tokens = ticket.tokens_after, "admitted");
        }
    }

    fn cancel(&self, seq: u64) {
        let mut state = self.state.lock();
        if let Some(position) = state.queue.iter().position(|entry| entry.seq == seq) {
            state.queue.remove(position);
            trace!(seq, pending = state.queue.len(), "withdrawn");
        }
    }
}

/// Owned by the drain task; releases the loop if the task is dropped early
///
/// Created before the task is spawned, so a task dropped before its first
/// poll (runtime shut down) still marks the throttler idle. Entries left in
/// the queue are dropped and their callers see [`ThrottleError::Closed`].
struct DrainGuard {
    shared: Arc<Shared>,
    started: bool,
    idle: bool,
}

impl DrainGuard {
    fn new(shared: Arc<Shared>) -> Self {
        Self { shared, started: false, idle: false }
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.idle {
            return;
        }

        let mut state = self.shared.state.lock();
        state.running = false;
        if self.started {
            self.shared.active_drains.fetch_sub(1, Ordering::AcqRel);
        }

        let abandoned = state.queue.len();
        state.queue.clear();
        warn!(abandoned, "drain loop dropped before the queue emptied");
    }
}

async fn drain(mut guard: DrainGuard) {
    let previous = guard.shared.active_drains.fetch_add(1, Ordering::AcqRel);
    guard.started = true;
    debug_assert_eq!(previous, 0, "more than one drain loop active for a throttler");
    debug!(pending = guard.shared.state.lock().queue.len(), "drain loop started");

    while let Some(wait) = guard.shared.step() {
        guard.shared.clock.sleep(wait).await;
    }

    // step() marked the loop idle under the lock
    guard.idle = true;
    debug!("drain loop idle");
}

/// Future returned by [`Throttler::throttle`], resolving once admitted
///
/// Dropping it before resolution removes the entry from the queue, so
/// wrapping it in `tokio::time::timeout` is a proper admission timeout.
#[must_use = "the request is only admitted once the admission is awaited"]
pub struct Admission {
    seq: u64,
    receiver: oneshot::Receiver<Ticket>,
    shared: Weak<Shared>,
    completed: bool,
}

impl Admission {
    /// Enqueue sequence number of this request
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Future for Admission {
    type Output = Result<Ticket>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(result) => {
                self.completed = true;
                Poll::Ready(result.map_err(|_| ThrottleError::Closed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel(self.seq);
        }
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission").field("seq", &self.seq).field("completed", &self.completed).finish()
    }
}
