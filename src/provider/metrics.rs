// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing how token requests were satisfied.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	requests: AtomicU64,
	cache_hits: AtomicU64,
	coalesced: AtomicU64,
	exchanges: AtomicU64,
	assertion_reads: AtomicU64,
	failures: AtomicU64,
}
impl ProviderMetrics {
	/// Returns the total number of `get_token` calls.
	pub fn requests(&self) -> u64 {
		self.requests.load(Ordering::Relaxed)
	}

	/// Returns the number of calls answered from the token cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of calls resolved by another caller's in-flight refresh.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	/// Returns the number of exchange requests sent to the token endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of times the assertion source was read (successful or not).
	pub fn assertion_reads(&self) -> u64 {
		self.assertion_reads.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_assertion_read(&self) {
		self.assertion_reads.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
