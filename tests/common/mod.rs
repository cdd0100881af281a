//! Shared fixtures for integration tests: a scripted token transport, assertion files, and
//! config/provider builders.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	io::Write,
	path::Path,
	pin::Pin,
	sync::Arc,
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use time::{Duration, OffsetDateTime, macros};
use tokio::time::Instant;
// self
use workload_credential::{
	CredentialConfig, CredentialProvider, Error,
	auth::{ClientId, ScopeSet, TenantId},
	clock::ManualClock,
	error::TransientError,
	exchange::{
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http},
	},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	classify::ErrorClassifier,
	url::Url,
};

pub const CLIENT_ID: &str = "00000000-0000-0000-0000-00000000c11e";
pub const TENANT_ID: &str = "contoso.onmicrosoft.com";
pub const VAULT: &str = "https://vault.azure.net/.default";
pub const GRAPH: &str = "https://graph.microsoft.com/.default";

pub type ScriptedProvider = CredentialProvider<ScriptedHttpClient, ScriptedTransportErrorMapper>;

pub fn t0() -> OffsetDateTime {
	macros::datetime!(2025-01-01 00:00 UTC)
}

pub fn deadline() -> Instant {
	Instant::now() + StdDuration::from_secs(5)
}

pub fn vault() -> ScopeSet {
	ScopeSet::single(VAULT).expect("Vault scope should be valid.")
}

pub fn graph() -> ScopeSet {
	ScopeSet::single(GRAPH).expect("Graph scope should be valid.")
}

/// Writes `contents` to a fresh temp file standing in for the mounted assertion.
pub fn assertion_file(contents: &str) -> NamedTempFile {
	let mut file = NamedTempFile::new().expect("Assertion temp file should be created.");

	write!(file, "{contents}").expect("Assertion fixture should be written.");

	file
}

/// Atomically replaces the assertion file contents, the way an orchestrator rotates it.
pub fn rotate_assertion(path: &Path, contents: &str) {
	std::fs::write(path, contents).expect("Rotated assertion should be written.");
}

pub fn config(assertion: &Path) -> CredentialConfig {
	config_with_authority(assertion, None)
}

pub fn config_with_authority(assertion: &Path, authority: Option<&str>) -> CredentialConfig {
	let mut builder = CredentialConfig::builder(
		ClientId::new(CLIENT_ID).expect("Client fixture should be valid."),
		TenantId::new(TENANT_ID).expect("Tenant fixture should be valid."),
	)
	.assertion_file(assertion)
	.assertion_ttl(Duration::minutes(5))
	.safety_margin(Duration::minutes(5));

	if let Some(authority) = authority {
		builder = builder.authority_host(Url::parse(authority).expect("Authority should parse."));
	}

	builder.build().expect("Config fixture should validate.")
}

/// Config whose exchanges go to `endpoint` instead of the derived authority endpoint.
pub fn config_with_token_endpoint(assertion: &Path, endpoint: &str) -> CredentialConfig {
	CredentialConfig::builder(
		ClientId::new(CLIENT_ID).expect("Client fixture should be valid."),
		TenantId::new(TENANT_ID).expect("Tenant fixture should be valid."),
	)
	.assertion_file(assertion)
	.token_endpoint(Url::parse(endpoint).expect("Token endpoint should parse."))
	.build()
	.expect("Config fixture should validate.")
}

pub fn scripted_provider(
	config: CredentialConfig,
	transport: &ScriptedHttpClient,
	clock: &ManualClock,
) -> ScriptedProvider {
	CredentialProvider::with_http_client(
		config,
		transport.clone(),
		ScriptedTransportErrorMapper,
	)
	.expect("Provider should build.")
	.with_clock(Arc::new(clock.clone()))
}

pub fn scripted_provider_with_classifier(
	config: CredentialConfig,
	transport: &ScriptedHttpClient,
	clock: &ManualClock,
	classifier: Arc<dyn ErrorClassifier>,
) -> ScriptedProvider {
	scripted_provider(config, transport, clock).with_classifier(classifier)
}

pub fn token_body(access_token: &str, expires_in: u64) -> Value {
	json!({
		"access_token": access_token,
		"token_type": "Bearer",
		"expires_in": expires_in,
		"ext_expires_in": expires_in,
	})
}

pub fn oauth_error_body(error: &str, description: &str) -> Value {
	json!({
		"error": error,
		"error_description": description,
		"error_codes": [700024],
	})
}

/// Parses a captured `application/x-www-form-urlencoded` body.
pub fn form_fields(body: &str) -> Vec<(String, String)> {
	url::form_urlencoded::parse(body.as_bytes()).into_owned().collect()
}

pub fn form_value(body: &str, key: &str) -> Option<String> {
	form_fields(body).into_iter().find(|(name, _)| name == key).map(|(_, value)| value)
}

#[derive(Debug)]
pub struct FakeTransportError;
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Connection reset by fake transport.")
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Debug)]
enum Scripted {
	Respond { status: u16, body: Value, retry_after: Option<Duration> },
	Fail,
}

#[derive(Debug, Default)]
struct ScriptState {
	responses: Mutex<VecDeque<Scripted>>,
	requests: Mutex<Vec<String>>,
	delay: Mutex<Option<StdDuration>>,
}

/// In-process token endpoint that replays queued responses and records request bodies.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHttpClient(Arc<ScriptState>);
impl ScriptedHttpClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delays every response, widening the window for concurrent callers to pile up.
	pub fn with_delay(self, delay: StdDuration) -> Self {
		*self.0.delay.lock() = Some(delay);

		self
	}

	pub fn respond(&self, status: u16, body: Value) -> &Self {
		self.0.responses.lock().push_back(Scripted::Respond { status, body, retry_after: None });

		self
	}

	pub fn respond_with_retry_after(&self, status: u16, body: Value, retry_after: Duration) -> &Self {
		self.0.responses.lock().push_back(Scripted::Respond {
			status,
			body,
			retry_after: Some(retry_after),
		});

		self
	}

	pub fn fail(&self) -> &Self {
		self.0.responses.lock().push_back(Scripted::Fail);

		self
	}

	pub fn requests(&self) -> Vec<String> {
		self.0.requests.lock().clone()
	}

	pub fn calls(&self) -> usize {
		self.0.requests.lock().len()
	}
}
impl TokenHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { state: self.0.clone(), slot }
	}
}

pub struct ScriptedHandle {
	state: Arc<ScriptState>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let state = self.state.clone();
		let slot = self.slot.clone();
		let body = String::from_utf8_lossy(request.body()).into_owned();

		Box::pin(async move {
			slot.take();
			state.requests.lock().push(body);

			let delay = *state.delay.lock();

			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			let next = state.responses.lock().pop_front();
			let (status, body, retry_after) = match next {
				Some(Scripted::Respond { status, body, retry_after }) => (status, body, retry_after),
				Some(Scripted::Fail) =>
					return Err(HttpClientError::Reqwest(Box::new(FakeTransportError))),
				None => (
					503,
					json!({ "error": "temporarily_unavailable", "error_description": "script exhausted" }),
					None,
				),
			};

			slot.store(ResponseMetadata { status: Some(status), retry_after });

			let response = http::Response::builder()
				.status(status)
				.header(http::header::CONTENT_TYPE, "application/json")
				.body(body.to_string().into_bytes())
				.expect("Scripted response should build.");

			Ok(response)
		})
	}
}

/// Maps scripted transport failures to network errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedTransportErrorMapper;
impl TransportErrorMapper<FakeTransportError> for ScriptedTransportErrorMapper {
	fn map_transport_error(
		&self,
		_classifier: &dyn ErrorClassifier,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<FakeTransportError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => TransientError::network(*inner).into(),
			other => TransientError::TokenEndpoint {
				message: format!("Scripted transport failure: {other}"),
				status: meta.and_then(|value| value.status),
				retry_after: meta.and_then(|value| value.retry_after),
			}
			.into(),
		}
	}
}
