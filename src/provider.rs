//! Caller-facing credential provider.
//!
//! [`CredentialProvider::get_token`] answers from the access-token cache when it can. On a miss
//! the caller joins the scope key's single flight: one caller reads the assertion (through the
//! TTL cache), performs the exchange, stores the token, and hands the outcome to every caller
//! that queued behind it. A rejected assertion triggers exactly one forced re-read and one retried
//! exchange; every other failure is returned as-is.

mod flight;
mod metrics;

pub use metrics::ProviderMetrics;

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time;
// self
use crate::{
	_prelude::*,
	assertion::{AssertionCache, AssertionFileReader, AssertionReader},
	auth::{AccessToken, Assertion, ScopeSet},
	cache::AccessTokenCache,
	classify::ErrorClassifier,
	clock::{Clock, SystemClock},
	config::CredentialConfig,
	error::{ConfigError, ExchangeError, TimeoutStage},
	exchange::{TokenExchangeClient, TransportErrorMapper},
	http::TokenHttpClient,
	obs::{self, Operation, OperationSpan, Outcome},
};
#[cfg(feature = "reqwest")]
use crate::{exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient};
use flight::{Boarding, Flight, Flights};

// Stand-in deadline for timeouts past what `Instant` can represent.
const FAR_FUTURE: StdDuration = StdDuration::from_secs(86_400 * 365 * 30);

/// Provider specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestCredentialProvider =
	CredentialProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Hands out access tokens for a federated workload identity.
///
/// The provider is `Send + Sync`; share it behind an [`Arc`] across tasks.
pub struct CredentialProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: CredentialConfig,
	clock: Arc<dyn Clock>,
	assertions: AssertionCache,
	exchange: TokenExchangeClient<C, M>,
	tokens: AccessTokenCache,
	flights: Flights,
	metrics: Arc<ProviderMetrics>,
}
impl<C, M> CredentialProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: CredentialConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		config.validate().map_err(ConfigError::from)?;

		let metrics = Arc::new(ProviderMetrics::default());
		let reader = Arc::new(AssertionFileReader::new(&config.assertion_file));
		let assertions =
			AssertionCache::new(reader, config.assertion_ttl).with_metrics(metrics.clone());
		let exchange = TokenExchangeClient::new(&config, http_client, mapper)?;
		let tokens = AccessTokenCache::new(config.safety_margin);

		Ok(Self {
			config,
			clock: Arc::new(SystemClock),
			assertions,
			exchange,
			tokens,
			flights: Flights::default(),
			metrics,
		})
	}

	/// Replaces the wall clock (tests and simulations).
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Replaces the assertion source; the configured TTL still applies.
	pub fn with_assertion_reader(mut self, reader: Arc<dyn AssertionReader>) -> Self {
		self.assertions =
			AssertionCache::new(reader, self.config.assertion_ttl).with_metrics(self.metrics.clone());

		self
	}

	/// Replaces the error classifier used by the exchange.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.exchange = self.exchange.with_classifier(classifier);

		self
	}

	/// Configuration captured at construction.
	pub fn config(&self) -> &CredentialConfig {
		&self.config
	}

	/// Counters describing how requests were satisfied.
	pub fn metrics(&self) -> &ProviderMetrics {
		&self.metrics
	}

	/// Returns a usable access token for `scope`, refreshing it if needed before `deadline`.
	pub async fn get_token(&self, scope: &ScopeSet, deadline: Instant) -> Result<AccessToken> {
		const OPERATION: Operation = Operation::GetToken;

		let span = OperationSpan::new(OPERATION, scope.key().as_str());

		self.metrics.record_request();
		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span.instrument(self.acquire(scope, deadline)).await;

		match &result {
			Ok(_) => obs::record_outcome(OPERATION, Outcome::Success),
			Err(_) => {
				self.metrics.record_failure();
				obs::record_outcome(OPERATION, Outcome::Failure);
			},
		}

		result
	}

	/// [`get_token`](Self::get_token) with a deadline `timeout` from now.
	pub async fn get_token_within(
		&self,
		scope: &ScopeSet,
		timeout: StdDuration,
	) -> Result<AccessToken> {
		let now = Instant::now();
		let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);

		self.get_token(scope, deadline).await
	}

	/// Drops the cached token for `scope` (e.g. after the resource rejected it).
	///
	/// Returns whether a token was cached. The next call for `scope` performs a new exchange.
	pub fn invalidate(&self, scope: &ScopeSet) -> bool {
		self.tokens.invalidate(scope)
	}

	/// Drops cached tokens that are no longer usable; returns how many were removed.
	///
	/// Refresh slots left behind by cancelled callers are swept as well.
	pub fn purge_expired(&self) -> usize {
		self.flights.prune();

		self.tokens.purge_expired(self.clock.now())
	}

	async fn acquire(&self, scope: &ScopeSet, deadline: Instant) -> Result<AccessToken> {
		if scope.is_empty() {
			return Err(ExchangeError::InvalidScope {
				reason: "At least one scope is required.".into(),
			}
			.into());
		}
		if let Some(token) = self.cached(scope) {
			return Ok(token);
		}

		let flight = self.flights.get(scope.key());
		let outcome = self.fly(&flight, scope, deadline).await;

		self.flights.release(scope.key(), flight);

		outcome
	}

	async fn fly(&self, flight: &Flight, scope: &ScopeSet, deadline: Instant) -> Result<AccessToken> {
		let pilot = match flight.board(deadline).await? {
			Boarding::Landed(outcome) => {
				self.metrics.record_coalesced();
				obs::record_outcome(Operation::GetToken, Outcome::Coalesced);

				return outcome;
			},
			Boarding::Pilot(pilot) => pilot,
		};

		// A refresh may have finished between the first lookup and boarding.
		if let Some(token) = self.cached(scope) {
			return Ok(token);
		}

		let outcome = self.refresh(scope, deadline).await;

		// Deadlines belong to the leading caller; waiters retry under their own.
		if !matches!(outcome, Err(Error::Timeout { .. })) {
			pilot.publish(&outcome);
		}

		outcome
	}

	fn cached(&self, scope: &ScopeSet) -> Option<AccessToken> {
		let token = self.tokens.get(scope, self.clock.now())?;

		self.metrics.record_cache_hit();
		obs::record_outcome(Operation::GetToken, Outcome::CacheHit);

		Some(token)
	}

	async fn refresh(&self, scope: &ScopeSet, deadline: Instant) -> Result<AccessToken> {
		let assertion = self.assertions.current(self.clock.now(), deadline).await?;
		let token = match self.exchange_within(&assertion, scope, deadline).await {
			Err(e) if e.is_invalid_assertion() => {
				obs::debug_assertion_rejected(&e);

				let reread = self.assertions.refresh(self.clock.now(), deadline).await?;

				self.exchange_within(&reread, scope, deadline).await?
			},
			result => result?,
		};

		self.tokens.put(token.clone());

		Ok(token)
	}

	async fn exchange_within(
		&self,
		assertion: &Assertion,
		scope: &ScopeSet,
		deadline: Instant,
	) -> Result<AccessToken> {
		self.metrics.record_exchange();

		let requested_at = self.clock.now();

		time::timeout_at(deadline, self.exchange.exchange(assertion, scope, requested_at))
			.await
			.map_err(|_| Error::Timeout { stage: TimeoutStage::Exchange })?
	}
}
#[cfg(feature = "reqwest")]
impl CredentialProvider<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a provider with its own redirect-free reqwest transport.
	pub fn new(config: CredentialConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Self::with_http_client(config, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for CredentialProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialProvider")
			.field("config", &self.config)
			.field("exchange", &self.exchange)
			.field("cached_tokens", &self.tokens.len())
			.finish_non_exhaustive()
	}
}
