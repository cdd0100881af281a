//! Credential-level error types shared by the assertion cache, the exchange client, and the
//! provider façade.
//!
//! Every variant is `Clone` so a single refresh outcome can be handed to all callers that
//! coalesced onto it. Sources are therefore kept behind [`Arc`].

// std
use std::io;
// self
use crate::{_prelude::*, assertion::AssertionError, config::CredentialConfigError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error surfaced by [`CredentialProvider::get_token`](crate::CredentialProvider::get_token).
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// The signed assertion could not be loaded.
	#[error(transparent)]
	Assertion(#[from] AssertionError),
	/// The token endpoint rejected or failed the exchange.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The caller-supplied deadline elapsed before a token was obtained.
	#[error("Deadline elapsed while {stage}.")]
	Timeout {
		/// Step that was still running when the deadline fired.
		stage: TimeoutStage,
	},
}
impl Error {
	/// Returns `true` when the caller may retry the operation (with backoff) and reasonably
	/// expect a different outcome without administrative or code changes.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Assertion(_) | Self::Timeout { .. } => true,
			Self::Exchange(err) => err.is_retryable(),
			Self::Config(_) => false,
		}
	}

	/// Returns `true` when the token endpoint rejected the presented assertion.
	pub fn is_invalid_assertion(&self) -> bool {
		matches!(self, Self::Exchange(ExchangeError::InvalidAssertion { .. }))
	}
}
impl From<TransientError> for Error {
	fn from(e: TransientError) -> Self {
		Self::Exchange(e.into())
	}
}

/// Step of a token request that a deadline interrupted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutStage {
	/// Waiting for another caller's refresh of the same scope set.
	WaitingForRefresh,
	/// Reading the assertion from its source.
	AssertionRead,
	/// Exchanging the assertion at the token endpoint.
	Exchange,
}
impl TimeoutStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::WaitingForRefresh => "waiting for an in-flight refresh",
			Self::AssertionRead => "reading the assertion",
			Self::Exchange => "exchanging the assertion",
		}
	}
}
impl Display for TimeoutStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failure categories reported by the token endpoint exchange.
#[derive(Clone, Debug, ThisError)]
pub enum ExchangeError {
	/// The assertion is expired, malformed, or not trusted by the identity provider.
	#[error("Identity provider rejected the client assertion: {reason}")]
	InvalidAssertion {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The workload identity lacks the requested grant.
	#[error("Workload identity lacks the requested permissions: {reason}")]
	InsufficientPermissions {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The requested scope is malformed or names an unknown resource.
	#[error("Requested scope is invalid: {reason}")]
	InvalidScope {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
}
impl ExchangeError {
	/// Only transient failures are worth retrying without changing inputs.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an error status or unexpected response.
	#[error("Token endpoint returned an unexpected response: {message}")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned a well-formed response without a usable expiry.
	#[error("Token endpoint returned an unusable token response: {reason}.")]
	InvalidTokenResponse {
		/// What was wrong with the response.
		reason: &'static str,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying I/O failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io {
		/// Original I/O error.
		#[source]
		source: Arc<io::Error>,
	},
}
impl TransientError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}

	/// HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::TokenResponseParse { status, .. } => *status,
			_ => None,
		}
	}

	/// Retry-After hint supplied by the token endpoint, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<io::Error> for TransientError {
	fn from(e: io::Error) -> Self {
		Self::Io { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransientError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Configuration and request-construction failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// Credential configuration failed validation.
	#[error(transparent)]
	InvalidConfig(#[from] CredentialConfigError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// A PEM bundle of root certificates contained no certificate.
	#[error("Root certificate bundle contains no certificate.")]
	EmptyCertificateBundle,
	/// HTTP request construction failed.
	#[error("Token request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// Token endpoint derived from the configuration is not a valid URL.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retryability_follows_taxonomy() {
		let transient: Error = TransientError::TokenEndpoint {
			message: "server_error".into(),
			status: Some(503),
			retry_after: Some(Duration::seconds(7)),
		}
		.into();

		assert!(transient.is_retryable());
		assert!(Error::Timeout { stage: TimeoutStage::Exchange }.is_retryable());
		assert!(
			!Error::from(ExchangeError::InsufficientPermissions { reason: "AADSTS65001".into() })
				.is_retryable()
		);
		assert!(!Error::from(ExchangeError::InvalidScope { reason: "bad".into() }).is_retryable());

		let invalid = Error::from(ExchangeError::InvalidAssertion { reason: "expired".into() });

		assert!(invalid.is_invalid_assertion());
		assert!(!invalid.is_retryable());
	}

	#[test]
	fn transient_accessors_expose_metadata() {
		let err = TransientError::TokenEndpoint {
			message: "throttled".into(),
			status: Some(429),
			retry_after: Some(Duration::seconds(3)),
		};

		assert_eq!(err.status(), Some(429));
		assert_eq!(err.retry_after(), Some(Duration::seconds(3)));
		assert_eq!(TransientError::from(io::Error::other("reset")).status(), None);
	}

	#[test]
	fn cloned_errors_keep_sources() {
		let err: Error = TransientError::from(io::Error::other("connection reset")).into();
		let cloned = err.clone();
		let source = StdError::source(&cloned).expect("Transparent variant should expose a source.");

		assert_eq!(source.to_string(), "connection reset");
		assert_eq!(err.to_string(), cloned.to_string());
	}

	#[test]
	fn timeout_display_names_stage() {
		let err = Error::Timeout { stage: TimeoutStage::WaitingForRefresh };

		assert_eq!(err.to_string(), "Deadline elapsed while waiting for an in-flight refresh.");
	}
}
