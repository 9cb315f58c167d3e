//! Circuit breaker pattern for resilient server communication
//!
//! Prevents cascade failures by temporarily disabling requests to failing servers.
//! State only moves through `allow_request`, `record_success` and `record_failure`
//! (plus the scheduled half-open timer); nothing outside this module can set it.

use crate::core::events::{EventBus, GatewayEvent};
use dashmap::DashMap;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failure threshold reached - requests are rejected
    Open,
    /// Probing whether the server has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes
    #[validate(range(min = 1))]
    pub success_threshold: u32,
    /// How long the circuit stays open before a trial request is allowed
    pub timeout_ms: u64,
    /// Interval of the background sweep
    #[validate(range(min = 1))]
    pub monitoring_period_ms: u64,
    /// Inactivity after which closed-state counters are cleared
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
            reset_timeout_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected_requests: u64,
    pub times_opened: u64,
    pub open_reason: Option<String>,
    /// Milliseconds since the last failure, if any
    pub since_last_failure_ms: Option<u64>,
    pub since_state_change_ms: u64,
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    last_activity: Instant,
    open_reason: Option<String>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    rejected_requests: u64,
    times_opened: u64,
    half_open_timer: Option<CancellationToken>,
}

impl BreakerState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            status: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_state_change: now,
            last_activity: now,
            open_reason: None,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            rejected_requests: 0,
            times_opened: 0,
            half_open_timer: None,
        }
    }
}

#[derive(Debug)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    reason: Option<String>,
}

/// Circuit breaker for a single server
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, events: EventBus) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().status
    }

    /// Gate checked before every dispatch
    pub fn allow_request(&self) -> bool {
        let (allowed, transition) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            state.total_requests += 1;

            match state.status {
                CircuitState::Closed => {
                    self.expire_stale_counts(&mut state, now);
                    state.last_activity = now;
                    (true, None)
                }
                CircuitState::Open => {
                    if self.open_timeout_elapsed(&state, now) {
                        state.last_activity = now;
                        let t = self.transition(&mut state, CircuitState::HalfOpen, None, now);
                        (true, Some(t))
                    } else {
                        state.rejected_requests += 1;
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    state.last_activity = now;
                    (true, None)
                }
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
        allowed
    }

    pub fn record_success(&self) {
        let transition = {
            let mut state = self.state.lock();
            let now = Instant::now();
            state.total_successes += 1;

            let transition = match state.status {
                CircuitState::Closed => {
                    self.expire_stale_counts(&mut state, now);
                    state.consecutive_failures = 0;
                    state.consecutive_successes += 1;
                    None
                }
                CircuitState::HalfOpen => {
                    state.consecutive_successes += 1;
                    if state.consecutive_successes >= self.config.success_threshold {
                        Some(self.transition(
                            &mut state,
                            CircuitState::Closed,
                            Some("recovered".to_string()),
                            now,
                        ))
                    } else {
                        None
                    }
                }
                // Late result from a request admitted before the circuit opened
                CircuitState::Open => None,
            };
            state.last_activity = now;
            transition
        };

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    pub fn record_failure(self: &Arc<Self>, reason: &str) {
        let (transition, timer) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            state.total_failures += 1;

            let transition = match state.status {
                CircuitState::Closed => {
                    self.expire_stale_counts(&mut state, now);
                    state.consecutive_failures += 1;
                    state.consecutive_successes = 0;
                    if state.consecutive_failures >= self.config.failure_threshold {
                        Some(self.transition(
                            &mut state,
                            CircuitState::Open,
                            Some(reason.to_string()),
                            now,
                        ))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    state.consecutive_failures += 1;
                    Some(self.transition(
                        &mut state,
                        CircuitState::Open,
                        Some(reason.to_string()),
                        now,
                    ))
                }
                CircuitState::Open => None,
            };

            state.last_failure_time = Some(now);
            state.last_activity = now;

            let timer = match &transition {
                Some(t) if t.to == CircuitState::Open => {
                    let token = CancellationToken::new();
                    state.half_open_timer = Some(token.clone());
                    Some(token)
                }
                _ => None,
            };
            (transition, timer)
        };

        if let Some(token) = timer {
            self.schedule_half_open(token);
        }
        if let Some(t) = transition {
            self.announce(t);
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        let now = Instant::now();
        CircuitSnapshot {
            name: self.name.clone(),
            state: state.status,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            total_requests: state.total_requests,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            rejected_requests: state.rejected_requests,
            times_opened: state.times_opened,
            open_reason: state.open_reason.clone(),
            since_last_failure_ms: state
                .last_failure_time
                .map(|t| now.duration_since(t).as_millis() as u64),
            since_state_change_ms: now.duration_since(state.last_state_change).as_millis() as u64,
        }
    }

    /// Periodic housekeeping: clear stale closed-state counters and move
    /// expired open circuits to half-open when no timer could be scheduled.
    pub fn sweep(&self) {
        let transition = {
            let mut state = self.state.lock();
            let now = Instant::now();
            match state.status {
                CircuitState::Closed => {
                    self.expire_stale_counts(&mut state, now);
                    None
                }
                CircuitState::Open if self.open_timeout_elapsed(&state, now) => {
                    Some(self.transition(&mut state, CircuitState::HalfOpen, None, now))
                }
                _ => None,
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn schedule_half_open(self: &Arc<Self>, token: CancellationToken) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(
                "No runtime for half-open timer of '{}', relying on lazy check",
                self.name
            );
            return;
        };

        let breaker: Weak<Self> = Arc::downgrade(self);
        let delay = self.config.open_timeout();
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(breaker) = breaker.upgrade() {
                        breaker.sweep();
                    }
                }
            }
        });
    }

    fn open_timeout_elapsed(&self, state: &BreakerState, now: Instant) -> bool {
        match state.last_failure_time {
            Some(at) => now.duration_since(at) >= self.config.open_timeout(),
            None => true,
        }
    }

    fn expire_stale_counts(&self, state: &mut BreakerState, now: Instant) {
        let idle = now.duration_since(state.last_activity);
        if idle >= self.config.reset_timeout()
            && (state.consecutive_failures > 0 || state.consecutive_successes > 0)
        {
            debug!(
                "Circuit breaker '{}' cleared stale counters after {}ms idle",
                self.name,
                idle.as_millis()
            );
            state.consecutive_failures = 0;
            state.consecutive_successes = 0;
        }
    }

    fn transition(
        &self,
        state: &mut BreakerState,
        to: CircuitState,
        reason: Option<String>,
        now: Instant,
    ) -> Transition {
        let from = state.status;
        state.status = to;
        state.last_state_change = now;

        match to {
            CircuitState::Open => {
                state.times_opened += 1;
                state.consecutive_successes = 0;
                state.open_reason = reason.clone();
            }
            CircuitState::HalfOpen => {
                state.consecutive_failures = 0;
                state.consecutive_successes = 0;
            }
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.consecutive_successes = 0;
                state.open_reason = None;
            }
        }

        if to != CircuitState::Open {
            if let Some(timer) = state.half_open_timer.take() {
                timer.cancel();
            }
        }

        Transition { from, to, reason }
    }

    fn announce(&self, transition: Transition) {
        match transition.to {
            CircuitState::Open => warn!(
                "Circuit breaker '{}' opened ({} -> open): {}",
                self.name,
                transition.from,
                transition.reason.as_deref().unwrap_or("failure threshold reached")
            ),
            CircuitState::HalfOpen => {
                info!("Circuit breaker '{}' transitioned to half-open", self.name)
            }
            CircuitState::Closed => info!("Circuit breaker '{}' closed after recovery", self.name),
        }

        self.events.emit(GatewayEvent::CircuitStateChanged {
            server: self.name.clone(),
            from: transition.from,
            to: transition.to,
            reason: transition.reason,
        });
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.state.lock().half_open_timer.take() {
            timer.cancel();
        }
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().half_open_timer.take() {
            timer.cancel();
        }
    }
}

/// Registry of circuit breakers, one per server name
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    events: EventBus,
    monitor: Mutex<Option<CancellationToken>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig, events: EventBus) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            events,
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or create the breaker for a server
    pub fn register(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Registering circuit breaker for '{}'", name);
                CircuitBreaker::new(name, self.config.clone(), self.events.clone())
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Unknown servers are allowed; their breaker is created on registration.
    pub fn should_allow_request(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => breaker.allow_request(),
            None => true,
        }
    }

    pub fn record_success(&self, name: &str) {
        if let Some(breaker) = self.get(name) {
            breaker.record_success();
        }
    }

    pub fn record_failure(&self, name: &str, reason: &str) {
        if let Some(breaker) = self.get(name) {
            breaker.record_failure(reason);
        }
    }

    pub fn state(&self, name: &str) -> Option<CircuitState> {
        self.get(name).map(|b| b.state())
    }

    pub fn snapshot(&self, name: &str) -> Option<CircuitSnapshot> {
        self.get(name).map(|b| b.snapshot())
    }

    pub fn all_snapshots(&self) -> HashMap<String, CircuitSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Drop a server's breaker state, cancelling any pending timer
    pub fn remove(&self, name: &str) -> bool {
        match self.breakers.remove(name) {
            Some((_, breaker)) => {
                breaker.cancel_timer();
                debug!("Removed circuit breaker for '{}'", name);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Start the periodic sweep. No-op outside a runtime or when already running.
    pub fn start_monitor(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, circuit breaker monitor not started");
            return;
        };

        let token = {
            let mut monitor = self.monitor.lock();
            if monitor.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *monitor = Some(token.clone());
            token
        };

        let manager = Arc::downgrade(self);
        let period = self.config.monitoring_period();
        handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        for entry in manager.breakers.iter() {
                            entry.value().sweep();
                        }
                    }
                }
            }
            debug!("Circuit breaker monitor stopped");
        });
    }

    pub fn stop_monitor(&self) {
        if let Some(token) = self.monitor.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for CircuitBreakerManager {
    fn drop(&mut self) {
        self.stop_monitor();
        for entry in self.breakers.iter() {
            entry.value().cancel_timer();
        }
    }
}
