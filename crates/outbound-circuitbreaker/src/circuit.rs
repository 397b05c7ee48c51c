use crate::classifier::Verdict;
use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
use tokio::time::Instant;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls pass through and outcomes are counted.
    Closed = 0,
    /// Calls are rejected without contacting the dependency.
    Open = 1,
    /// A limited number of probe calls are let through.
    HalfOpen = 2,
}

impl CircuitState {
    /// Stable lowercase label, used for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counts for the current generation.
///
/// Cleared whenever the breaker changes state and whenever the closed-state
/// interval elapses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BreakerCounts {
    /// Calls with a recorded outcome.
    pub requests: u32,
    /// Successful calls.
    pub total_successes: u32,
    /// Failed calls.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl BreakerCounts {
    fn on_success(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures over requests, `0.0` when nothing has been recorded.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Admission ticket for one call: the generation it was admitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) generation: u64,
}

/// The breaker's mutable state. Always accessed under the breaker's lock.
pub(crate) struct Circuit {
    state: CircuitState,
    generation: u64,
    counts: BreakerCounts,
    /// Calls admitted in this generation that have not been ignored.
    admitted: u32,
    /// Closed: end of the counting interval. Open: end of the cool-down.
    expiry: Option<Instant>,
    opened_at: Option<Instant>,
    last_state_change: Instant,
}

impl Circuit {
    pub(crate) fn new(config: &CircuitBreakerConfig, now: Instant) -> Self {
        let mut circuit = Self {
            state: CircuitState::Closed,
            generation: 0,
            counts: BreakerCounts::default(),
            admitted: 0,
            expiry: None,
            opened_at: None,
            last_state_change: now,
        };
        circuit.new_generation(config, now);
        circuit
    }

    /// The stored state, without applying due transitions.
    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn counts(&self) -> BreakerCounts {
        self.counts
    }

    pub(crate) fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub(crate) fn last_state_change(&self) -> Instant {
        self.last_state_change
    }

    /// Applies any transition that is due at `now` and returns the state.
    ///
    /// Open moves to HalfOpen lazily here, on the first look after the
    /// cool-down; there is no background timer.
    pub(crate) fn current_state(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) -> CircuitState {
        match self.state {
            CircuitState::Closed => {
                if matches!(self.expiry, Some(expiry) if expiry <= now) {
                    self.new_generation(config, now);
                }
            }
            CircuitState::Open => {
                if matches!(self.expiry, Some(expiry) if expiry <= now) {
                    self.transition_to(CircuitState::HalfOpen, config, now, events);
                }
            }
            CircuitState::HalfOpen => {}
        }
        self.state
    }

    /// Decides whether a call may proceed.
    pub(crate) fn try_acquire(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) -> Option<Ticket> {
        let state = self.current_state(config, now, events);
        let permitted = match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.admitted < config.max_requests,
        };

        if !permitted {
            events.push(CircuitBreakerEvent::CallRejected {
                name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state,
            });
            return None;
        }

        self.admitted = self.admitted.saturating_add(1);
        events.push(CircuitBreakerEvent::CallPermitted {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
            state,
        });
        Some(Ticket {
            generation: self.generation,
        })
    }

    /// Records the outcome of a call admitted with `ticket`.
    ///
    /// Outcomes from an earlier generation are dropped: the state they were
    /// admitted under no longer exists.
    pub(crate) fn record(
        &mut self,
        ticket: Ticket,
        verdict: Verdict,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        let state = self.current_state(config, now, events);
        if ticket.generation != self.generation {
            events.push(CircuitBreakerEvent::OutcomeIgnored {
                name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state,
                stale: true,
            });
            return;
        }

        match verdict {
            Verdict::Success => self.on_success(state, config, now, events),
            Verdict::Failure => self.on_failure(state, config, now, events),
            Verdict::Ignored => {
                self.admitted = self.admitted.saturating_sub(1);
                events.push(CircuitBreakerEvent::OutcomeIgnored {
                    name: config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    state,
                    stale: false,
                });
            }
        }
    }

    fn on_success(
        &mut self,
        state: CircuitState,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        self.counts.on_success();
        events.push(CircuitBreakerEvent::SuccessRecorded {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
            state,
        });

        if state == CircuitState::HalfOpen
            && self.counts.consecutive_successes >= config.max_requests
        {
            self.transition_to(CircuitState::Closed, config, now, events);
        }
    }

    fn on_failure(
        &mut self,
        state: CircuitState,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        self.counts.on_failure();
        events.push(CircuitBreakerEvent::FailureRecorded {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
            state,
        });

        match state {
            CircuitState::Closed => {
                if config.ready_to_trip(&self.counts) {
                    self.transition_to(CircuitState::Open, config, now, events);
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open, config, now, events);
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn transition_to(
        &mut self,
        state: CircuitState,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        if self.state == state {
            return;
        }

        let from_state = self.state;
        self.state = state;
        self.last_state_change = now;
        self.new_generation(config, now);

        events.push(CircuitBreakerEvent::StateTransition {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
            at: std::time::SystemTime::now(),
            from_state,
            to_state: state,
        });
    }

    /// Back to closed with a fresh generation, whatever the current state.
    pub(crate) fn reset(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        if self.state == CircuitState::Closed {
            self.new_generation(config, now);
        } else {
            self.transition_to(CircuitState::Closed, config, now, events);
        }
    }

    /// Starts a fresh generation: counts cleared, expiry re-armed.
    fn new_generation(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.counts = BreakerCounts::default();
        self.admitted = 0;

        match self.state {
            CircuitState::Closed => {
                self.expiry = (!config.interval.is_zero()).then(|| now + config.interval);
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.expiry = Some(now + config.timeout);
            }
            CircuitState::HalfOpen => {
                self.expiry = None;
            }
        }
    }
}
