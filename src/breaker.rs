//! Fail-fast circuit breaking for the upstream API.
//!
//! Feedback flows through [`BreakerPermit`] handles issued by
//! [`CircuitBreaker::try_acquire`]. Dropping a permit without recording an
//! outcome counts for nothing, so a call aborted before its network request
//! was sent never pollutes the failure count, and an abandoned half-open
//! trial releases the trial slot instead of wedging the breaker.

// self
use crate::{_prelude::*, error::ConfigError};

/// Threshold and cooldown policy for the breaker.
#[derive(Clone, Debug)]
pub struct BreakerPolicy {
	/// Consecutive qualifying failures that open the circuit.
	pub threshold: u32,
	/// Initial cooldown while open.
	pub cooldown: StdDuration,
	/// Ceiling for the exponentially backed-off cooldown.
	pub max_cooldown: StdDuration,
}
impl BreakerPolicy {
	/// Validates the policy invariants.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.threshold == 0 {
			return Err(ConfigError::ZeroThreshold);
		}

		Ok(())
	}
}
impl Default for BreakerPolicy {
	fn default() -> Self {
		Self {
			threshold: 3,
			cooldown: StdDuration::from_secs(5),
			max_cooldown: StdDuration::from_secs(60),
		}
	}
}

/// Observable breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
	/// Calls pass through; failures are counted.
	Closed,
	/// Calls fail immediately until the cooldown elapses.
	Open,
	/// Exactly one trial call probes recovery.
	HalfOpen,
}

struct BreakerInner {
	state: BreakerState,
	consecutive_failures: u32,
	opened_at: Option<Instant>,
	current_cooldown: StdDuration,
	trial_in_flight: bool,
}

struct Shared {
	policy: BreakerPolicy,
	inner: Mutex<BreakerInner>,
}

/// Shared circuit breaker; clones observe the same state.
#[derive(Clone)]
pub struct CircuitBreaker(Arc<Shared>);
impl CircuitBreaker {
	/// Creates a closed breaker for the provided policy.
	pub fn new(policy: BreakerPolicy) -> Self {
		let inner = BreakerInner {
			state: BreakerState::Closed,
			consecutive_failures: 0,
			opened_at: None,
			current_cooldown: policy.cooldown,
			trial_in_flight: false,
		};

		Self(Arc::new(Shared { policy, inner: Mutex::new(inner) }))
	}

	/// Admits a call or fails fast with [`Error::CircuitOpen`].
	///
	/// While open, the cooldown is checked against the elapsed time since the
	/// circuit opened; once it elapses the breaker moves to half-open and
	/// this call becomes the single trial. Transitions are atomic with
	/// respect to concurrent callers.
	pub fn try_acquire(&self) -> Result<BreakerPermit> {
		let mut inner = self.0.inner.lock();

		match inner.state {
			BreakerState::Closed => Ok(self.permit(false)),
			BreakerState::Open => {
				let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();

				if elapsed >= inner.current_cooldown {
					inner.state = BreakerState::HalfOpen;
					inner.trial_in_flight = true;

					Ok(self.permit(true))
				} else {
					Err(Error::CircuitOpen { retry_in: inner.current_cooldown - elapsed })
				}
			},
			BreakerState::HalfOpen =>
				if inner.trial_in_flight {
					Err(Error::CircuitOpen { retry_in: StdDuration::ZERO })
				} else {
					inner.trial_in_flight = true;

					Ok(self.permit(true))
				},
		}
	}

	/// Current state.
	pub fn state(&self) -> BreakerState {
		self.0.inner.lock().state
	}

	/// Current consecutive qualifying failure count.
	pub fn consecutive_failures(&self) -> u32 {
		self.0.inner.lock().consecutive_failures
	}

	fn permit(&self, trial: bool) -> BreakerPermit {
		BreakerPermit { shared: self.0.clone(), trial, resolved: false }
	}
}
impl Debug for CircuitBreaker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.0.inner.lock();

		f.debug_struct("CircuitBreaker")
			.field("state", &inner.state)
			.field("consecutive_failures", &inner.consecutive_failures)
			.finish()
	}
}

/// Single-call admission handle; report the outcome or drop to count nothing.
pub struct BreakerPermit {
	shared: Arc<Shared>,
	trial: bool,
	resolved: bool,
}
impl BreakerPermit {
	/// Records a successful call: resets the failure count and, for a trial,
	/// closes the circuit and restores the base cooldown.
	pub fn record_success(mut self) {
		self.resolved = true;

		let mut inner = self.shared.inner.lock();

		inner.consecutive_failures = 0;

		if self.trial {
			inner.state = BreakerState::Closed;
			inner.trial_in_flight = false;
			inner.opened_at = None;
			inner.current_cooldown = self.shared.policy.cooldown;
		}
	}

	/// Records a qualifying failure (429 or 5xx).
	///
	/// A failed trial re-opens the circuit with a doubled cooldown (capped);
	/// in the closed state the consecutive count grows until the threshold
	/// opens the circuit with the base cooldown.
	pub fn record_failure(mut self) {
		self.resolved = true;

		let policy = &self.shared.policy;
		let mut inner = self.shared.inner.lock();

		inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

		if self.trial {
			inner.state = BreakerState::Open;
			inner.opened_at = Some(Instant::now());
			inner.trial_in_flight = false;
			inner.current_cooldown = inner.current_cooldown.saturating_mul(2).min(policy.max_cooldown);
		} else if inner.state == BreakerState::Closed
			&& inner.consecutive_failures >= policy.threshold
		{
			inner.state = BreakerState::Open;
			inner.opened_at = Some(Instant::now());
			inner.current_cooldown = policy.cooldown;
		}
	}
}
impl Drop for BreakerPermit {
	fn drop(&mut self) {
		if self.resolved || !self.trial {
			return;
		}

		// Trial abandoned without an outcome: release the slot so the next
		// caller can probe instead.
		let mut inner = self.shared.inner.lock();

		if inner.state == BreakerState::HalfOpen {
			inner.trial_in_flight = false;
		}
	}
}
impl Debug for BreakerPermit {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BreakerPermit").field("trial", &self.trial).finish()
	}
}
