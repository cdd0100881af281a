//! Wall-clock abstraction used for assertion TTLs and token expiry checks.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven [`Clock`] for tests and simulations.
///
/// Clones share the same instant, so a handle kept by a test moves the clock seen by a provider.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}
