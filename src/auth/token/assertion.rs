//! The platform-issued signed assertion presented to the token endpoint.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Signed JWT proving the workload's identity, as last read from its source.
///
/// Assertions are only ever produced by an [`AssertionReader`](crate::assertion::AssertionReader);
/// this crate never mints one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
	/// Raw assertion value.
	pub value: TokenSecret,
	/// Instant the value was read from storage.
	pub read_at: OffsetDateTime,
}
impl Assertion {
	/// Wraps a freshly read assertion value.
	pub fn new(value: impl Into<String>, read_at: OffsetDateTime) -> Self {
		Self { value: TokenSecret::new(value), read_at }
	}

	/// Returns the raw assertion for request construction.
	pub fn expose(&self) -> &str {
		self.value.expose()
	}

	/// Age of the value relative to `now`.
	pub fn age_at(&self, now: OffsetDateTime) -> Duration {
		now - self.read_at
	}
}
