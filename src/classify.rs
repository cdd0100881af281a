//! Classification of token endpoint failures into the exchange error taxonomy.
//!
//! Classifiers only see crate-owned data (status code, OAuth fields, a body preview), so custom
//! implementations stay independent of the HTTP client in use.

// self
use crate::_prelude::*;

/// Maps a failed token exchange onto an [`ExchangeErrorKind`].
pub trait ErrorClassifier
where
	Self: Send + Sync,
{
	/// Classifies the failure described by `ctx`.
	fn classify(&self, ctx: &ExchangeErrorContext) -> ExchangeErrorKind;
}

/// Categories an exchange failure can fall into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeErrorKind {
	/// The assertion was rejected; the caller should re-read it and retry once.
	InvalidAssertion,
	/// The identity lacks the grant for the requested resource.
	InsufficientPermissions,
	/// The requested scope is malformed or unknown.
	InvalidScope,
	/// Temporary failure; retry with backoff.
	Transient,
}

/// Facts about a failed exchange handed to an [`ErrorClassifier`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeErrorContext {
	/// HTTP status code, when a response was received.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of a response body that was not a valid OAuth error document.
	pub body_preview: Option<String>,
	/// Whether the failure happened below HTTP (connect, TLS, reset).
	pub network_error: bool,
}
impl ExchangeErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Context for transport-level failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Default::default() }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a (truncated) body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Entra ID `AADSTS` error code embedded in the description, if any.
	pub fn aadsts_code(&self) -> Option<u32> {
		self.error_description.as_deref().and_then(parse_aadsts_code)
	}
}

/// Default classifier tuned for Entra ID with generic OAuth fallbacks.
///
/// A transport failure or a server-side status (5xx, 429) is always transient. Otherwise it checks,
/// in order: `AADSTS` code, OAuth `error` code, description and body keywords, and finally the
/// HTTP status.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultErrorClassifier;
impl ErrorClassifier for DefaultErrorClassifier {
	fn classify(&self, ctx: &ExchangeErrorContext) -> ExchangeErrorKind {
		if ctx.network_error || ctx.http_status.is_some_and(is_service_failure) {
			return ExchangeErrorKind::Transient;
		}

		ctx.aadsts_code()
			.and_then(classify_aadsts)
			.or_else(|| classify_oauth_error(ctx))
			.or_else(|| classify_keywords(ctx.error_description.as_deref()))
			.or_else(|| classify_keywords(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

/// Whether `status` reports a failure on the service side (5xx) or throttling (429).
pub fn is_service_failure(status: u16) -> bool {
	status == 429 || status >= 500
}

fn truncate_preview(body: String) -> String {
	match body.char_indices().nth(ExchangeErrorContext::BODY_PREVIEW_LIMIT) {
		Some((cut, _)) => format!("{}…", &body[..cut]),
		None => body,
	}
}

fn parse_aadsts_code(description: &str) -> Option<u32> {
	let (_, rest) = description.split_once("AADSTS")?;
	let digits = rest.chars().take_while(char::is_ascii_digit).collect::<String>();

	digits.parse().ok()
}

fn classify_aadsts(code: u32) -> Option<ExchangeErrorKind> {
	match code {
		// Invalid or unknown scope / resource.
		70011 | 500011 | 1002012 => Some(ExchangeErrorKind::InvalidScope),
		// Assertion expired, not yet valid, or signature/issuer rejected.
		50027 | 700024 | 700027 | 700211 | 700212 | 700213 =>
			Some(ExchangeErrorKind::InvalidAssertion),
		65001 | 70021 | 700016 | 7000112 => Some(ExchangeErrorKind::InsufficientPermissions),
		_ => None,
	}
}

fn classify_oauth_error(ctx: &ExchangeErrorContext) -> Option<ExchangeErrorKind> {
	let code = ctx.oauth_error.as_deref()?.to_ascii_lowercase();

	match code.as_str() {
		"invalid_scope" => Some(ExchangeErrorKind::InvalidScope),
		"invalid_client" | "invalid_grant" => Some(ExchangeErrorKind::InvalidAssertion),
		"unauthorized_client" | "access_denied" => Some(ExchangeErrorKind::InsufficientPermissions),
		"temporarily_unavailable" | "server_error" => Some(ExchangeErrorKind::Transient),
		"invalid_request"
			if ctx
				.error_description
				.as_deref()
				.is_some_and(|text| text.to_ascii_lowercase().contains("assertion")) =>
			Some(ExchangeErrorKind::InvalidAssertion),
		_ => None,
	}
}

fn classify_keywords(text: Option<&str>) -> Option<ExchangeErrorKind> {
	let lowered = text?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_scope") => Some(ExchangeErrorKind::InvalidScope),
		text if text.contains("invalid_client")
			|| text.contains("invalid_grant")
			|| text.contains("assertion") =>
			Some(ExchangeErrorKind::InvalidAssertion),
		text if text.contains("unauthorized_client") || text.contains("access_denied") =>
			Some(ExchangeErrorKind::InsufficientPermissions),
		text if text.contains("temporarily_unavailable") || text.contains("server_error") =>
			Some(ExchangeErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ExchangeErrorKind {
	match status {
		Some(400) => ExchangeErrorKind::InvalidScope,
		Some(401) => ExchangeErrorKind::InvalidAssertion,
		Some(403) => ExchangeErrorKind::InsufficientPermissions,
		_ => ExchangeErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify(ctx: ExchangeErrorContext) -> ExchangeErrorKind {
		DefaultErrorClassifier.classify(&ctx)
	}

	#[test]
	fn network_failures_are_transient() {
		assert_eq!(
			classify(ExchangeErrorContext::network_failure().with_oauth_error("invalid_scope")),
			ExchangeErrorKind::Transient
		);
	}

	#[test]
	fn aadsts_codes_take_precedence() {
		let ctx = ExchangeErrorContext::new()
			.with_http_status(400)
			.with_oauth_error("invalid_client")
			.with_error_description(
				"AADSTS70011: The provided request must include a 'scope' input parameter.",
			);

		assert_eq!(ctx.aadsts_code(), Some(70011));
		assert_eq!(classify(ctx), ExchangeErrorKind::InvalidScope);
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_oauth_error("invalid_client")
					.with_error_description("AADSTS700024: Client assertion is not within its valid time range.")
			),
			ExchangeErrorKind::InvalidAssertion
		);
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_oauth_error("invalid_grant")
					.with_error_description("AADSTS65001: The user or administrator has not consented.")
			),
			ExchangeErrorKind::InsufficientPermissions
		);
	}

	#[test]
	fn oauth_codes_map_to_kinds() {
		let cases = [
			("invalid_scope", ExchangeErrorKind::InvalidScope),
			("invalid_client", ExchangeErrorKind::InvalidAssertion),
			("INVALID_GRANT", ExchangeErrorKind::InvalidAssertion),
			("unauthorized_client", ExchangeErrorKind::InsufficientPermissions),
			("access_denied", ExchangeErrorKind::InsufficientPermissions),
			("temporarily_unavailable", ExchangeErrorKind::Transient),
		];

		for (code, expected) in cases {
			assert_eq!(
				classify(ExchangeErrorContext::new().with_http_status(400).with_oauth_error(code)),
				expected,
				"{code}"
			);
		}

		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_oauth_error("invalid_request")
					.with_error_description("client_assertion is malformed")
			),
			ExchangeErrorKind::InvalidAssertion
		);
	}

	#[test]
	fn status_is_the_last_resort() {
		let status = |code| classify(ExchangeErrorContext::new().with_http_status(code));

		assert_eq!(status(400), ExchangeErrorKind::InvalidScope);
		assert_eq!(status(401), ExchangeErrorKind::InvalidAssertion);
		assert_eq!(status(403), ExchangeErrorKind::InsufficientPermissions);
		assert_eq!(status(429), ExchangeErrorKind::Transient);
		assert_eq!(status(503), ExchangeErrorKind::Transient);
		assert_eq!(status(418), ExchangeErrorKind::Transient);
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_http_status(400)
					.with_body_preview("<html>client_assertion rejected</html>")
			),
			ExchangeErrorKind::InvalidAssertion
		);
	}

	#[test]
	fn service_failures_ignore_body_and_oauth_signals() {
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_http_status(502)
					.with_body_preview("<html>gateway access_denied upstream</html>")
			),
			ExchangeErrorKind::Transient
		);
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_http_status(503)
					.with_body_preview("Service unavailable: assertion validator offline")
			),
			ExchangeErrorKind::Transient
		);
		assert_eq!(
			classify(
				ExchangeErrorContext::new()
					.with_http_status(500)
					.with_oauth_error("invalid_client")
					.with_error_description("AADSTS700024: Client assertion is not within its valid time range.")
			),
			ExchangeErrorKind::Transient
		);
		assert_eq!(
			classify(ExchangeErrorContext::new().with_http_status(429).with_oauth_error("invalid_scope")),
			ExchangeErrorKind::Transient
		);
		assert!(is_service_failure(500));
		assert!(is_service_failure(429));
		assert!(!is_service_failure(401));
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx = ExchangeErrorContext::new().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ExchangeErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
