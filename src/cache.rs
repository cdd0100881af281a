//! In-memory access-token cache keyed by scope-set fingerprint.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeKey, ScopeSet},
};

/// Access tokens indexed by [`ScopeKey`].
///
/// Hits only take the shared side of the lock. A token stops being returned once
/// `now >= expires_at - safety_margin`, even though it stays stored until replaced, invalidated,
/// or purged.
#[derive(Debug)]
pub struct AccessTokenCache {
	entries: RwLock<HashMap<ScopeKey, AccessToken>>,
	safety_margin: Duration,
}
impl AccessTokenCache {
	/// Creates an empty cache using `safety_margin` for freshness checks.
	pub fn new(safety_margin: Duration) -> Self {
		Self { entries: RwLock::new(HashMap::new()), safety_margin }
	}

	/// Configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Returns a clone of the token for `scope` when it is still usable at `now`.
	pub fn get(&self, scope: &ScopeSet, now: OffsetDateTime) -> Option<AccessToken> {
		self.entries
			.read()
			.get(scope.key())
			.filter(|token| token.is_usable_at(now, self.safety_margin))
			.cloned()
	}

	/// Stores `token` under its scope set, replacing any previous entry.
	pub fn put(&self, token: AccessToken) {
		let key = token.scope.key().clone();

		self.entries.write().insert(key, token);
	}

	/// Drops the entry for `scope`; returns whether one existed.
	pub fn invalidate(&self, scope: &ScopeSet) -> bool {
		self.entries.write().remove(scope.key()).is_some()
	}

	/// Removes every entry that is no longer usable at `now`; returns how many were dropped.
	pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, token| token.is_usable_at(now, self.safety_margin));

		before - entries.len()
	}

	/// Number of stored entries, usable or not.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
