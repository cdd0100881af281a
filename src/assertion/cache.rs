// crates.io
use tokio::time;
// self
use crate::{
	_prelude::*,
	assertion::AssertionReader,
	auth::Assertion,
	error::TimeoutStage,
	obs::{self, Operation, Outcome},
	provider::ProviderMetrics,
};

/// TTL cache in front of an [`AssertionReader`].
///
/// The cached value is replaced only by a successful read. When a TTL-driven re-read fails the
/// previous assertion keeps being served; the token endpoint is the authority on whether it is
/// still acceptable.
pub struct AssertionCache {
	reader: Arc<dyn AssertionReader>,
	ttl: Duration,
	state: AsyncMutex<Option<Assertion>>,
	metrics: Arc<ProviderMetrics>,
}
impl AssertionCache {
	/// Creates an empty cache that re-reads `reader` once a value is `ttl` old.
	pub fn new(reader: Arc<dyn AssertionReader>, ttl: Duration) -> Self {
		Self { reader, ttl, state: AsyncMutex::new(None), metrics: Default::default() }
	}

	/// Shares read counters with a provider.
	pub fn with_metrics(mut self, metrics: Arc<ProviderMetrics>) -> Self {
		self.metrics = metrics;

		self
	}

	/// Configured reuse interval.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the cached assertion without touching the reader.
	pub async fn cached(&self) -> Option<Assertion> {
		self.state.lock().await.clone()
	}

	/// Returns the cached assertion, re-reading the source once it is at least `ttl` old.
	pub async fn current(&self, now: OffsetDateTime, deadline: Instant) -> Result<Assertion> {
		let mut state = self.lock_within(deadline).await?;

		if let Some(fresh) = state.as_ref().filter(|cached| cached.age_at(now) < self.ttl) {
			return Ok(fresh.clone());
		}

		match self.read_within(now, deadline).await {
			Ok(assertion) => {
				*state = Some(assertion.clone());

				Ok(assertion)
			},
			Err(e) => match state.as_ref() {
				Some(stale) => {
					obs::warn_stale_assertion(&e, stale.age_at(now));

					Ok(stale.clone())
				},
				None => Err(e),
			},
		}
	}

	/// Re-reads the source regardless of the TTL.
	///
	/// Used after the token endpoint rejects the assertion. A failed read is returned as-is and
	/// leaves the cached value untouched.
	pub async fn refresh(&self, now: OffsetDateTime, deadline: Instant) -> Result<Assertion> {
		let mut state = self.lock_within(deadline).await?;
		let assertion = self.read_within(now, deadline).await?;

		*state = Some(assertion.clone());

		Ok(assertion)
	}

	async fn lock_within(
		&self,
		deadline: Instant,
	) -> Result<async_lock::MutexGuard<'_, Option<Assertion>>> {
		time::timeout_at(deadline, self.state.lock())
			.await
			.map_err(|_| Error::Timeout { stage: TimeoutStage::AssertionRead })
	}

	async fn read_within(&self, now: OffsetDateTime, deadline: Instant) -> Result<Assertion> {
		const OPERATION: Operation = Operation::ReadAssertion;

		obs::record_outcome(OPERATION, Outcome::Attempt);
		self.metrics.record_assertion_read();

		let result = match time::timeout_at(deadline, self.reader.read()).await {
			Ok(Ok(value)) => Ok(Assertion::new(value, now)),
			Ok(Err(e)) => Err(Error::from(e)),
			Err(_) => Err(Error::Timeout { stage: TimeoutStage::AssertionRead }),
		};

		match &result {
			Ok(_) => obs::record_outcome(OPERATION, Outcome::Success),
			Err(_) => obs::record_outcome(OPERATION, Outcome::Failure),
		}

		result
	}
}
impl Debug for AssertionCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AssertionCache").field("ttl", &self.ttl).finish_non_exhaustive()
	}
}
