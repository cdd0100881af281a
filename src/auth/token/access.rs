//! Access tokens issued by the token endpoint, with expiry and safety-margin checks.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AccessTokenBuilderError {
	/// No token value was provided.
	#[error("Access token value is required.")]
	MissingToken,
	/// No expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// The token would already be expired when issued.
	#[error("Access token lifetime must be positive.")]
	NonPositiveLifetime,
	/// The expiry falls outside the representable date range.
	#[error("Access token expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Bearer access token obtained for one scope set.
#[derive(Clone)]
pub struct AccessToken {
	/// Token value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Token type reported by the endpoint (normally `Bearer`).
	pub token_type: String,
	/// Scope set the token was requested for.
	pub scope: ScopeSet,
	/// Instant the exchange request was sent.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry reported by (or derived from) the token endpoint.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for a token issued for `scope`.
	pub fn builder(scope: ScopeSet) -> AccessTokenBuilder {
		AccessTokenBuilder::new(scope)
	}

	/// Returns the raw token for use in an `Authorization` header.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}

	/// Renders the `Authorization` header value.
	pub fn authorization_header(&self) -> String {
		format!("{} {}", self.token_type, self.secret.expose())
	}

	/// Instant from which the token must no longer be handed out.
	///
	/// `None` when `expires_at - safety_margin` is not representable.
	pub fn refresh_at(&self, safety_margin: Duration) -> Option<OffsetDateTime> {
		self.expires_at.checked_sub(safety_margin)
	}

	/// Whether the token may still be reused at `now`, i.e. `now < expires_at - safety_margin`.
	pub fn is_usable_at(&self, now: OffsetDateTime, safety_margin: Duration) -> bool {
		self.refresh_at(safety_margin).is_some_and(|refresh_at| now < refresh_at)
	}

	/// Whether the token has expired outright at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Remaining lifetime at `now`; negative once expired.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	scope: ScopeSet,
	secret: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			secret: None,
			token_type: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the token value.
	pub fn token(mut self, token: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the request instant relative lifetimes are measured from.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a lifetime relative to `issued_at`. Takes precedence over `expires_at`.
	pub fn expires_in(mut self, lifetime: Duration) -> Self {
		self.expires_in = Some(lifetime);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let secret = self.secret.ok_or(AccessTokenBuilderError::MissingToken)?;

		if secret.expose().is_empty() {
			return Err(AccessTokenBuilderError::MissingToken);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_in, self.expires_at) {
			(Some(lifetime), _) =>
				issued_at.checked_add(lifetime).ok_or(AccessTokenBuilderError::ExpiryOutOfRange)?,
			(None, Some(instant)) => instant,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(AccessTokenBuilderError::NonPositiveLifetime);
		}

		Ok(AccessToken {
			secret,
			token_type: self.token_type.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.into()),
			scope: self.scope,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn vault() -> ScopeSet {
		ScopeSet::single("https://vault.azure.net/.default").expect("Vault scope should be valid.")
	}

	#[test]
	fn usable_window_stops_at_safety_margin() {
		let token = AccessToken::builder(vault())
			.token("at-abc")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token should build with a relative expiry.");
		let margin = Duration::minutes(5);

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert!(token.is_usable_at(macros::datetime!(2025-01-01 00:54:59 UTC), margin));
		assert!(!token.is_usable_at(macros::datetime!(2025-01-01 00:55 UTC), margin));
		assert!(!token.is_expired_at(macros::datetime!(2025-01-01 00:59:59 UTC)));
		assert!(token.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
		assert_eq!(
			token.remaining_at(macros::datetime!(2025-01-01 00:30 UTC)),
			Duration::minutes(30)
		);
	}

	#[test]
	fn relative_lifetime_wins_over_absolute_expiry() {
		let token = AccessToken::builder(vault())
			.token("at-abc")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 02:00 UTC))
			.expires_in(Duration::minutes(10))
			.build()
			.expect("Token should build.");

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 00:10 UTC));
	}

	#[test]
	fn builder_rejects_incomplete_tokens() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(
			AccessToken::builder(vault()).expires_in(Duration::hours(1)).build().err(),
			Some(AccessTokenBuilderError::MissingToken)
		);
		assert_eq!(
			AccessToken::builder(vault()).token("at").issued_at(issued).build().err(),
			Some(AccessTokenBuilderError::MissingExpiry)
		);
		assert_eq!(
			AccessToken::builder(vault())
				.token("at")
				.issued_at(issued)
				.expires_at(issued - Duration::seconds(1))
				.build()
				.err(),
			Some(AccessTokenBuilderError::NonPositiveLifetime)
		);
		assert_eq!(
			AccessToken::builder(vault())
				.token("at")
				.issued_at(issued)
				.expires_in(Duration::seconds(9_000_000_000_000))
				.build()
				.err(),
			Some(AccessTokenBuilderError::ExpiryOutOfRange)
		);
	}

	#[test]
	fn margin_past_the_date_range_is_unusable() {
		let issued = time::Date::MIN.midnight().assume_utc();
		let token = AccessToken::builder(vault())
			.token("at")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token near the minimum date should build.");

		assert_eq!(token.refresh_at(Duration::days(365)), None);
		assert!(!token.is_usable_at(issued, Duration::days(365)));
	}

	#[test]
	fn debug_and_header_formatting() {
		let token = AccessToken::builder(vault())
			.token("at-abc")
			.token_type("Bearer")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token should build.");

		assert_eq!(token.authorization_header(), "Bearer at-abc");
		assert!(!format!("{token:?}").contains("at-abc"));
	}
}
