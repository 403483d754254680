//! Rolling-window rate limiting with human-paced jitter.
//!
//! [`RateLimiter::acquire`] is the sole mutation point for the shared window:
//! it suspends callers until a slot frees up (deterministic sleep until the
//! oldest in-window grant expires, never a busy-wait) and then adds a
//! randomized pacing delay so request timing is decoupled from a fixed
//! cadence. Server-reported quota hints only ever tighten the local view.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, error::ConfigError, http::RateLimitHints};

/// Randomized pacing delay applied after a slot is granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingRange {
	/// Minimum delay.
	pub min: StdDuration,
	/// Maximum delay.
	pub max: StdDuration,
}
impl PacingRange {
	/// Disables pacing entirely; used by timing-sensitive tests.
	pub const ZERO: Self = Self { min: StdDuration::ZERO, max: StdDuration::ZERO };

	/// Creates a new range; `min` must not exceed `max`.
	pub const fn new(min: StdDuration, max: StdDuration) -> Self {
		Self { min, max }
	}

	fn sample(&self) -> StdDuration {
		if self.max <= self.min {
			return self.min;
		}

		let span = (self.max - self.min).as_millis() as u64;
		let offset = rand::rng().random_range(0..=span);

		self.min + StdDuration::from_millis(offset)
	}
}

/// Request budget for one rolling window, kept strictly below the remote
/// service's stated limit.
#[derive(Clone, Debug)]
pub struct RateBudget {
	/// Maximum grants per window.
	pub capacity: u32,
	/// Window length.
	pub period: StdDuration,
	/// Pacing jitter added after each grant.
	pub pacing: PacingRange,
}
impl RateBudget {
	/// Validates the budget invariants.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}
		if self.pacing.min > self.pacing.max {
			return Err(ConfigError::InvalidPacingRange);
		}

		Ok(())
	}
}
impl Default for RateBudget {
	fn default() -> Self {
		// 55 of Reddit's 60 per minute, leaving headroom for clock skew.
		Self {
			capacity: 55,
			period: StdDuration::from_secs(60),
			pacing: PacingRange::new(StdDuration::from_secs(1), StdDuration::from_secs(2)),
		}
	}
}

#[derive(Default)]
struct WindowState {
	grants: VecDeque<Instant>,
	server_remaining: Option<u32>,
	server_reset_at: Option<Instant>,
}
impl WindowState {
	fn prune(&mut self, now: Instant, period: StdDuration) {
		while self.grants.front().is_some_and(|grant| now.duration_since(*grant) >= period) {
			self.grants.pop_front();
		}

		if self.server_reset_at.is_some_and(|reset| reset <= now) {
			self.server_remaining = None;
			self.server_reset_at = None;
		}
	}

	fn next_wait(&self, now: Instant, budget: &RateBudget) -> Option<StdDuration> {
		if self.grants.len() >= budget.capacity as usize {
			let wait = self.grants.front().map(|oldest| {
				budget.period.checked_sub(now.duration_since(*oldest)).unwrap_or_default()
			})?;

			return Some(wait.max(StdDuration::from_millis(1)));
		}
		if self.server_remaining == Some(0) {
			let wait = self
				.server_reset_at
				.map(|reset| reset.saturating_duration_since(now))
				.unwrap_or(budget.period);

			return Some(wait.max(StdDuration::from_millis(1)));
		}

		None
	}
}

/// Shared rolling-window limiter with randomized pacing.
pub struct RateLimiter {
	budget: RateBudget,
	window: AsyncMutex<WindowState>,
}
impl RateLimiter {
	/// Creates a limiter for the provided budget.
	pub fn new(budget: RateBudget) -> Self {
		Self { budget, window: AsyncMutex::new(WindowState::default()) }
	}

	/// Blocks until issuing a request would stay within the budget, then
	/// applies the pacing delay.
	///
	/// Requests are delayed, never dropped; simultaneous callers contend for
	/// the window mutex so concurrent grants can never overshoot capacity.
	/// The budget is enforced at grant time: pacing runs after the grant is
	/// recorded, so uneven jitter can compress the spacing at which callers
	/// actually reach the network. The capacity headroom below the remote
	/// limit absorbs that drift.
	pub async fn acquire(&self) {
		loop {
			let wait = {
				let mut state = self.window.lock().await;
				let now = Instant::now();

				state.prune(now, self.budget.period);

				match state.next_wait(now, &self.budget) {
					None => {
						state.grants.push_back(now);

						if let Some(remaining) = state.server_remaining.as_mut() {
							*remaining = remaining.saturating_sub(1);
						}

						None
					},
					wait => wait,
				}
			};

			match wait {
				None => break,
				Some(delay) => tokio::time::sleep(delay).await,
			}
		}

		let pace = self.budget.pacing.sample();

		if !pace.is_zero() {
			tokio::time::sleep(pace).await;
		}
	}

	/// Tightens the local window from server-reported quota hints.
	///
	/// The sync is downward-only: the window never widens ahead of its own
	/// rollover, even when the server reports more remaining capacity than
	/// locally tracked.
	pub async fn note_hints(&self, hints: &RateLimitHints) {
		let Some(remaining) = hints.remaining else {
			return;
		};
		let remaining = remaining.max(0.0).floor() as u32;
		let mut state = self.window.lock().await;
		let now = Instant::now();

		state.prune(now, self.budget.period);

		let local = self.budget.capacity.saturating_sub(state.grants.len() as u32);

		if remaining < local {
			state.server_remaining = Some(remaining);
			state.server_reset_at = Some(now + hints.reset_in.unwrap_or(self.budget.period));
		}
	}

	/// Number of grants currently inside the window.
	pub async fn in_window(&self) -> usize {
		let mut state = self.window.lock().await;
		let now = Instant::now();

		state.prune(now, self.budget.period);

		state.grants.len()
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").field("budget", &self.budget).finish()
	}
}
