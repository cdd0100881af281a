//! OAuth 2.0 client-credentials exchange authenticated with a JWT-bearer client assertion.
//!
//! [`TokenExchangeClient`] builds the request with the `oauth2` crate, sends it through a
//! [`TokenHttpClient`], and turns every failure into an [`ExchangeError`] via an
//! [`ErrorClassifier`]. Transport-specific failures pass through a [`TransportErrorMapper`] first.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId as OAuthClientId, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
use serde::{Deserializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AccessTokenBuilderError, Assertion, ScopeSet},
	classify::{
		self, DefaultErrorClassifier, ErrorClassifier, ExchangeErrorContext, ExchangeErrorKind,
	},
	config::CredentialConfig,
	error::{ConfigError, ExchangeError, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::{self, Operation, OperationSpan, Outcome},
};

/// `client_assertion_type` value for JWT-bearer client authentication (RFC 7523).
pub const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

type EntraTokenResponse = StandardTokenResponse<EntraTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	EntraTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type ExchangeRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Maps transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		classifier: &dyn ErrorClassifier,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		classifier: &dyn ErrorClassifier,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(classifier, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransientError::from(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unrecognized transport failure"),
		}
	}
}

/// Performs the assertion-for-token exchange against one token endpoint.
pub struct TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	token_endpoint: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	classifier: Arc<dyn ErrorClassifier>,
}
impl<C, M> TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client for the token endpoint derived from `config`.
	pub fn new(
		config: &CredentialConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_endpoint = config.token_endpoint()?;
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let oauth_client = Client::new(OAuthClientId::new(config.client_id.to_string()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self {
			oauth_client,
			token_endpoint,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			classifier: Arc::new(DefaultErrorClassifier),
		})
	}

	/// Replaces the default error classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Token endpoint the client posts to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Exchanges `assertion` for an access token covering `scope`.
	///
	/// Relative lifetimes are measured from `requested_at`, the instant the request was sent.
	pub async fn exchange(
		&self,
		assertion: &Assertion,
		scope: &ScopeSet,
		requested_at: OffsetDateTime,
	) -> Result<AccessToken> {
		const OPERATION: Operation = Operation::Exchange;

		let span = OperationSpan::new(OPERATION, scope.key().as_str());

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span.instrument(self.send(assertion, scope, requested_at)).await;

		match &result {
			Ok(_) => obs::record_outcome(OPERATION, Outcome::Success),
			Err(_) => obs::record_outcome(OPERATION, Outcome::Failure),
		}

		result
	}

	async fn send(
		&self,
		assertion: &Assertion,
		scope: &ScopeSet,
		requested_at: OffsetDateTime,
	) -> Result<AccessToken> {
		if scope.is_empty() {
			return Err(ExchangeError::InvalidScope {
				reason: "At least one scope is required.".into(),
			}
			.into());
		}

		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let mut request = self
			.oauth_client
			.exchange_client_credentials()
			.add_extra_param("client_assertion_type", JWT_BEARER_ASSERTION_TYPE)
			.add_extra_param("client_assertion", assertion.expose().to_owned());

		for entry in scope.iter() {
			request = request.add_scope(Scope::new(entry.to_owned()));
		}

		let response = request.request_async(&handle).await.map_err(|err| {
			map_request_error(self.classifier.as_ref(), meta.take(), err, self.error_mapper.as_ref())
		})?;

		map_token_response(response, scope, requested_at)
	}
}
impl<C, M> Debug for TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchangeClient")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.finish_non_exhaustive()
	}
}

/// Entra ID extensions to the standard token response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntraTokenFields {
	/// Absolute expiry in Unix seconds; sent as a number or a numeric string.
	#[serde(
		default,
		deserialize_with = "deserialize_unix_seconds",
		skip_serializing_if = "Option::is_none"
	)]
	pub expires_on: Option<i64>,
}
impl ExtraTokenFields for EntraTokenFields {}

fn deserialize_unix_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString {
		Number(i64),
		String(String),
	}

	match Option::<NumberOrString>::deserialize(deserializer)? {
		None => Ok(None),
		Some(NumberOrString::Number(value)) => Ok(Some(value)),
		Some(NumberOrString::String(value)) =>
			value.trim().parse().map(Some).map_err(DeError::custom),
	}
}

fn map_token_response(
	response: EntraTokenResponse,
	scope: &ScopeSet,
	requested_at: OffsetDateTime,
) -> Result<AccessToken> {
	let mut builder = AccessToken::builder(scope.clone())
		.token(response.access_token().secret().to_owned())
		.token_type(token_type_label(response.token_type()))
		.issued_at(requested_at);

	if let Some(lifetime) = response.expires_in() {
		let secs = i64::try_from(lifetime.as_secs()).map_err(|_| {
			TransientError::InvalidTokenResponse { reason: "expires_in is out of range" }
		})?;

		builder = builder.expires_in(Duration::seconds(secs));
	} else if let Some(unix) = response.extra_fields().expires_on {
		let expires_at = OffsetDateTime::from_unix_timestamp(unix).map_err(|_| {
			TransientError::InvalidTokenResponse { reason: "expires_on is out of range" }
		})?;

		builder = builder.expires_at(expires_at);
	}

	builder.build().map_err(|e| {
		let reason = match e {
			AccessTokenBuilderError::MissingToken => "access_token is empty",
			AccessTokenBuilderError::MissingExpiry => "neither expires_in nor expires_on is present",
			AccessTokenBuilderError::NonPositiveLifetime => "token lifetime is not positive",
			AccessTokenBuilderError::ExpiryOutOfRange => "token expiry is out of range",
		};

		TransientError::InvalidTokenResponse { reason }.into()
	})
}

fn token_type_label(token_type: &BasicTokenType) -> String {
	match token_type {
		BasicTokenType::Bearer => "Bearer".into(),
		BasicTokenType::Mac => "MAC".into(),
		BasicTokenType::Extension(value) => value.clone(),
	}
}

fn map_request_error<E, M>(
	classifier: &dyn ErrorClassifier,
	meta: Option<ResponseMetadata>,
	err: ExchangeRequestError<E>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(classifier, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(classifier, meta_ref, error),
		RequestTokenError::Parse(error, body) => {
			let transient = TransientError::TokenResponseParse {
				source: Arc::new(error),
				status: meta_status(meta_ref),
			};

			classify_unstructured(classifier, meta_ref, &String::from_utf8_lossy(&body), transient)
		},
		RequestTokenError::Other(message) => {
			let transient = TransientError::TokenEndpoint {
				message: message.clone(),
				status: meta_status(meta_ref),
				retry_after: meta_retry_after(meta_ref),
			};

			classify_unstructured(classifier, meta_ref, &message, transient)
		},
	}
}

fn map_server_response_error(
	classifier: &dyn ErrorClassifier,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref().to_owned();
	let mut ctx = ExchangeErrorContext::new().with_oauth_error(code.clone());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let reason = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code,
	};

	match classifier.classify(&ctx) {
		ExchangeErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		kind => exchange_error(kind, reason),
	}
}

// A 4xx body that is not an OAuth error document still carries a signal; 5xx and 429 stay
// transient whatever their body says.
fn classify_unstructured(
	classifier: &dyn ErrorClassifier,
	meta: Option<&ResponseMetadata>,
	body: &str,
	transient: TransientError,
) -> Error {
	let Some(status) = meta_status(meta)
		.filter(|status| *status >= 400 && !classify::is_service_failure(*status))
	else {
		return transient.into();
	};
	let ctx = ExchangeErrorContext::new().with_http_status(status).with_body_preview(body);

	match classifier.classify(&ctx) {
		ExchangeErrorKind::Transient => transient.into(),
		kind => exchange_error(kind, format!("HTTP {status}: {}", transient)),
	}
}

fn exchange_error(kind: ExchangeErrorKind, reason: String) -> Error {
	match kind {
		ExchangeErrorKind::InvalidAssertion => ExchangeError::InvalidAssertion { reason },
		ExchangeErrorKind::InsufficientPermissions =>
			ExchangeError::InsufficientPermissions { reason },
		ExchangeErrorKind::InvalidScope => ExchangeError::InvalidScope { reason },
		ExchangeErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: None,
			retry_after: None,
		}
		.into(),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	classifier: &dyn ErrorClassifier,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "Request timed out while calling the token endpoint.".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	match classifier.classify(&ExchangeErrorContext::network_failure()) {
		ExchangeErrorKind::Transient => TransientError::from(err).into(),
		kind => exchange_error(kind, err.to_string()),
	}
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}."),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
