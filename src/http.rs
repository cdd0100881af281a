//! Transport seam for token exchanges.
//!
//! [`TokenHttpClient`] is the crate's only dependency on an HTTP stack. Each exchange asks the
//! client for a short-lived [`AsyncHttpClient`] handle bound to a fresh [`ResponseMetadataSlot`];
//! the handle records the status and `Retry-After` hint so failures can be classified after
//! `oauth2` has consumed the response.

// std
#[cfg(feature = "reqwest")] use std::{net::SocketAddr, ops::Deref};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError};
#[cfg(feature = "reqwest")] use oauth2::{HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")]
use reqwest::{
	Certificate,
	header::{HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// HTTP transport able to execute token exchanges while publishing response metadata.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back many providers, and
/// the handles they return must own their state so request futures stay `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records outcomes in `slot`.
	///
	/// Handles must call [`ResponseMetadataSlot::take`] before sending and
	/// [`ResponseMetadataSlot::store`] once a status is known, including for error statuses.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata from the most recent HTTP response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot sharing [`ResponseMetadata`] between the transport and error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// [`ReqwestClient`] wrapper used as the default transport.
///
/// Token endpoints answer directly; a redirect is never followed. [`ReqwestHttpClient::new`] and
/// [`ReqwestHttpClient::builder`] build clients configured that way, and any client passed to
/// [`ReqwestHttpClient::with_client`] should be configured the same.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a rustls-backed client that does not follow redirects.
	pub fn new() -> Result<Self, ConfigError> {
		Self::builder().build()
	}

	/// Starts a client with extra trust roots or pinned host addresses.
	pub fn builder() -> ReqwestHttpClientBuilder {
		ReqwestHttpClientBuilder::default()
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}

/// Builder for [`ReqwestHttpClient`] values reaching a token endpoint behind a private CA.
///
/// Identity-binding proxies serve a certificate issued by a cluster CA for a fixed server name.
/// Trust that CA with [`root_certificates_pem`](Self::root_certificates_pem), point the token
/// endpoint at the server name, and pin the name to the proxy address with
/// [`resolve`](Self::resolve) so TLS verifies against it.
#[cfg(feature = "reqwest")]
#[derive(Default)]
pub struct ReqwestHttpClientBuilder {
	root_certificates: Vec<Certificate>,
	resolve: Vec<(String, SocketAddr)>,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClientBuilder {
	/// Trusts every certificate in a PEM bundle in addition to the built-in roots.
	pub fn root_certificates_pem(mut self, pem: &[u8]) -> Result<Self, ConfigError> {
		let certificates = Certificate::from_pem_bundle(pem)?;

		if certificates.is_empty() {
			return Err(ConfigError::EmptyCertificateBundle);
		}

		self.root_certificates.extend(certificates);

		Ok(self)
	}

	/// Connects to `addr` whenever a request targets `host`; TLS still verifies `host`.
	pub fn resolve(mut self, host: impl Into<String>, addr: SocketAddr) -> Self {
		self.resolve.push((host.into(), addr));

		self
	}

	/// Builds the redirect-free client.
	pub fn build(self) -> Result<ReqwestHttpClient, ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(Policy::none());

		for certificate in self.root_certificates {
			builder = builder.add_root_certificate(certificate);
		}
		for (host, addr) in &self.resolve {
			builder = builder.resolve(host, *addr);
		}

		Ok(ReqwestHttpClient(builder.build()?))
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestHttpClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestHttpClientBuilder")
			.field("root_certificates", &self.root_certificates.len())
			.field("resolve", &self.resolve)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers, OffsetDateTime::now_utc());

			inner.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}
#[cfg(feature = "reqwest")]
impl Debug for InstrumentedHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("InstrumentedHandle(..)")
	}
}

/// Parses `Retry-After` as delta-seconds or an HTTP date relative to `now`.
#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
