//! Circuit breaker for the maintenance loop's broker calls.
//!
//! After a run of consecutive cycle failures the breaker opens and
//! maintenance cycles are skipped outright, giving the broker API time
//! to recover instead of hammering it from both the tick and timer
//! paths. After the reset timeout one probe cycle is allowed through.
//!
//! The hot path (`is_open`) is lock-free: state lives in atomics so the
//! tick handler can consult the breaker without contention.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Breaker state, encoded as u32 for atomic storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BreakerState {
    /// Normal operation, cycles run.
    Closed = 0,
    /// Cycles are skipped until the reset timeout elapses.
    Open = 1,
    /// One probe cycle is allowed to test recovery.
    HalfOpen = 2,
}

impl BreakerState {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

pub struct CircuitBreaker {
    state: AtomicU32,
    failure_count: AtomicU32,
    /// Last failure time as nanoseconds since `created_at`.
    last_failure_nanos: AtomicU64,
    created_at: Instant,
    failure_threshold: u32,
    reset_timeout_nanos: u64,
}

impl CircuitBreaker {
    /// `failure_threshold` consecutive failures open the breaker;
    /// `reset_timeout` later a single probe is allowed.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: AtomicU32::new(BreakerState::Closed as u32),
            failure_count: AtomicU32::new(0),
            last_failure_nanos: AtomicU64::new(0),
            created_at: Instant::now(),
            failure_threshold,
            reset_timeout_nanos: reset_timeout.as_nanos() as u64,
        }
    }

    #[inline]
    fn elapsed_nanos(&self) -> u64 {
        self.created_at.elapsed().as_nanos() as u64
    }

    pub fn state(&self) -> BreakerState {
        BreakerState::from_u32(self.state.load(Ordering::Acquire))
    }

    /// True while cycles should be skipped. Transitions Open -> HalfOpen
    /// once the reset timeout has elapsed, admitting one probe.
    pub fn is_open(&self) -> bool {
        match self.state() {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let last = self.last_failure_nanos.load(Ordering::Acquire);
                if self.elapsed_nanos().saturating_sub(last) >= self.reset_timeout_nanos {
                    // Only one skipper wins the transition; the rest keep
                    // seeing HalfOpen and pass through as well.
                    if self
                        .state
                        .compare_exchange(
                            BreakerState::Open as u32,
                            BreakerState::HalfOpen as u32,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        info!("circuit breaker half-open, allowing a probe cycle");
                    }
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Record a successful cycle; closes the breaker from any state.
    pub fn record_success(&self) {
        let previous = self.state.swap(BreakerState::Closed as u32, Ordering::AcqRel);
        self.failure_count.store(0, Ordering::Release);
        if BreakerState::from_u32(previous) != BreakerState::Closed {
            info!("circuit breaker closed after successful cycle");
        }
    }

    /// Record a failed cycle. Opens the breaker when the consecutive
    /// failure count reaches the threshold, or immediately if a HalfOpen
    /// probe fails.
    pub fn record_failure(&self) {
        self.last_failure_nanos
            .store(self.elapsed_nanos(), Ordering::Release);
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        let currently = self.state();
        if currently == BreakerState::HalfOpen || failures >= self.failure_threshold {
            let previous = self.state.swap(BreakerState::Open as u32, Ordering::AcqRel);
            if BreakerState::from_u32(previous) != BreakerState::Open {
                warn!(
                    consecutive_failures = failures,
                    threshold = self.failure_threshold,
                    "circuit breaker opened, maintenance cycles will be skipped"
                );
            }
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }
}
