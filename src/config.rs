//! Immutable credential configuration and its validating builder.
//!
//! A [`CredentialConfig`] names the workload identity (client + tenant), the authority host that
//! serves the token endpoint, where the orchestrator mounts the assertion, and the two time
//! windows that bound staleness: how long an assertion is reused before the file is read again,
//! and how long before expiry an access token stops being handed out.
//!
//! Configs can be assembled in code through [`CredentialConfig::builder`] or deserialized from any
//! serde format; both paths run the same validation.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId},
	error::ConfigError,
};

/// Public-cloud Entra ID authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
/// Default interval between assertion file reads.
pub const DEFAULT_ASSERTION_TTL: Duration = Duration::minutes(5);
/// Default buffer subtracted from token expiry before a token is considered unusable.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);

const TOKEN_ENDPOINT_SUFFIX: &str = "oauth2/v2.0/token";

/// Errors raised while validating a [`CredentialConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialConfigError {
	/// No assertion file path was configured.
	#[error("Assertion file path is required.")]
	MissingAssertionFile,
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// The authority host could not be parsed.
	#[error("Authority host is not a valid URL: {value}.")]
	InvalidAuthorityHost {
		/// Raw value that failed to parse.
		value: String,
	},
	/// The authority host must use HTTPS (plain HTTP is accepted for loopback hosts only).
	#[error("Authority host must use HTTPS: {url}.")]
	InsecureAuthorityHost {
		/// Offending URL.
		url: String,
	},
	/// The authority host must not carry a query or fragment.
	#[error("Authority host must not contain a query or fragment: {url}.")]
	AuthorityHostHasQuery {
		/// Offending URL.
		url: String,
	},
	/// The token endpoint override could not be parsed.
	#[error("Token endpoint is not a valid URL: {value}.")]
	InvalidTokenEndpoint {
		/// Raw value that failed to parse.
		value: String,
	},
	/// The token endpoint override must use HTTPS (plain HTTP is accepted for loopback hosts only).
	#[error("Token endpoint must use HTTPS: {url}.")]
	InsecureTokenEndpoint {
		/// Offending URL.
		url: String,
	},
	/// The token endpoint override must not carry a query or fragment.
	#[error("Token endpoint must not contain a query or fragment: {url}.")]
	TokenEndpointHasQuery {
		/// Offending URL.
		url: String,
	},
	/// The safety margin must be strictly positive.
	#[error("Safety margin must be positive.")]
	NonPositiveSafetyMargin,
	/// The assertion TTL cannot be negative.
	#[error("Assertion TTL cannot be negative.")]
	NegativeAssertionTtl,
}

/// Immutable configuration captured when a provider is constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCredentialConfig", into = "RawCredentialConfig")]
pub struct CredentialConfig {
	/// Application (client) identifier of the workload identity.
	pub client_id: ClientId,
	/// Directory (tenant) identifier.
	pub tenant_id: TenantId,
	/// Base URL of the identity provider (e.g. `https://login.microsoftonline.com/`).
	pub authority_host: Url,
	/// Explicit token endpoint used instead of the one derived from the authority host.
	///
	/// Identity-binding setups route the exchange through a node-local proxy at a fixed URL.
	pub token_endpoint_override: Option<Url>,
	/// Path of the orchestrator-mounted assertion file.
	pub assertion_file: PathBuf,
	/// Interval during which a previously read assertion is reused.
	pub assertion_ttl: Duration,
	/// Buffer subtracted from token expiry before a cached token stops being served.
	pub safety_margin: Duration,
}
impl CredentialConfig {
	/// Creates a builder for the provided identity.
	pub fn builder(client_id: ClientId, tenant_id: TenantId) -> CredentialConfigBuilder {
		CredentialConfigBuilder::new(client_id, tenant_id)
	}

	/// Authority URL (`{authority_host}/{tenant_id}/`).
	pub fn authority(&self) -> Result<Url, ConfigError> {
		let base = self.authority_host.as_str().trim_end_matches('/');

		Url::parse(&format!("{base}/{}/", self.tenant_id))
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })
	}

	/// Token endpoint: the override when set, else `{authority_host}/{tenant_id}/oauth2/v2.0/token`.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		if let Some(url) = &self.token_endpoint_override {
			return Ok(url.clone());
		}

		self.authority()?
			.join(TOKEN_ENDPOINT_SUFFIX)
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })
	}

	/// Runs the same checks as [`CredentialConfigBuilder::build`].
	pub fn validate(&self) -> Result<(), CredentialConfigError> {
		if self.assertion_file.as_os_str().is_empty() {
			return Err(CredentialConfigError::MissingAssertionFile);
		}
		if !self.safety_margin.is_positive() {
			return Err(CredentialConfigError::NonPositiveSafetyMargin);
		}
		if self.assertion_ttl.is_negative() {
			return Err(CredentialConfigError::NegativeAssertionTtl);
		}

		let authority = &self.authority_host;

		check_endpoint_url(authority).map_err(|defect| match defect {
			UrlDefect::HasQuery =>
				CredentialConfigError::AuthorityHostHasQuery { url: authority.to_string() },
			UrlDefect::Insecure =>
				CredentialConfigError::InsecureAuthorityHost { url: authority.to_string() },
		})?;

		let Some(url) = &self.token_endpoint_override else {
			return Ok(());
		};

		check_endpoint_url(url).map_err(|defect| match defect {
			UrlDefect::HasQuery => CredentialConfigError::TokenEndpointHasQuery { url: url.to_string() },
			UrlDefect::Insecure => CredentialConfigError::InsecureTokenEndpoint { url: url.to_string() },
		})
	}
}

/// Builder for [`CredentialConfig`] values.
#[derive(Debug)]
pub struct CredentialConfigBuilder {
	client_id: ClientId,
	tenant_id: TenantId,
	authority_host: Option<Url>,
	token_endpoint: Option<Url>,
	assertion_file: Option<PathBuf>,
	assertion_ttl: Duration,
	safety_margin: Duration,
}
impl CredentialConfigBuilder {
	fn new(client_id: ClientId, tenant_id: TenantId) -> Self {
		Self {
			client_id,
			tenant_id,
			authority_host: None,
			token_endpoint: None,
			assertion_file: None,
			assertion_ttl: DEFAULT_ASSERTION_TTL,
			safety_margin: DEFAULT_SAFETY_MARGIN,
		}
	}

	/// Overrides the authority host (defaults to [`DEFAULT_AUTHORITY_HOST`]).
	pub fn authority_host(mut self, url: Url) -> Self {
		self.authority_host = Some(url);

		self
	}

	/// Posts exchanges to `url` instead of the endpoint derived from the authority host.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the assertion file path.
	pub fn assertion_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.assertion_file = Some(path.into());

		self
	}

	/// Overrides the assertion reuse interval.
	pub fn assertion_ttl(mut self, ttl: Duration) -> Self {
		self.assertion_ttl = ttl;

		self
	}

	/// Overrides the access-token safety margin.
	pub fn safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<CredentialConfig, CredentialConfigError> {
		let authority_host = match self.authority_host {
			Some(url) => url,
			None => default_authority_host()?,
		};
		let config = CredentialConfig {
			client_id: self.client_id,
			tenant_id: self.tenant_id,
			authority_host,
			token_endpoint_override: self.token_endpoint,
			assertion_file: self.assertion_file.ok_or(CredentialConfigError::MissingAssertionFile)?,
			assertion_ttl: self.assertion_ttl,
			safety_margin: self.safety_margin,
		};

		config.validate()?;

		Ok(config)
	}
}

/// Serialized shape of [`CredentialConfig`]; durations are whole seconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCredentialConfig {
	client_id: String,
	tenant_id: String,
	#[serde(default)]
	authority_host: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	token_endpoint: Option<String>,
	assertion_file: PathBuf,
	#[serde(default = "default_assertion_ttl_secs")]
	assertion_ttl_secs: i64,
	#[serde(default = "default_safety_margin_secs")]
	safety_margin_secs: i64,
}
impl TryFrom<RawCredentialConfig> for CredentialConfig {
	type Error = CredentialConfigError;

	fn try_from(raw: RawCredentialConfig) -> Result<Self, Self::Error> {
		let mut builder = CredentialConfig::builder(
			ClientId::new(&raw.client_id)?,
			TenantId::new(&raw.tenant_id)?,
		)
		.assertion_file(raw.assertion_file)
		.assertion_ttl(Duration::seconds(raw.assertion_ttl_secs))
		.safety_margin(Duration::seconds(raw.safety_margin_secs));

		if let Some(host) = raw.authority_host {
			let url = Url::parse(&host)
				.map_err(|_| CredentialConfigError::InvalidAuthorityHost { value: host })?;

			builder = builder.authority_host(url);
		}
		if let Some(endpoint) = raw.token_endpoint {
			let url = Url::parse(&endpoint)
				.map_err(|_| CredentialConfigError::InvalidTokenEndpoint { value: endpoint })?;

			builder = builder.token_endpoint(url);
		}

		builder.build()
	}
}
impl From<CredentialConfig> for RawCredentialConfig {
	fn from(config: CredentialConfig) -> Self {
		Self {
			client_id: config.client_id.into(),
			tenant_id: config.tenant_id.into(),
			authority_host: Some(config.authority_host.into()),
			token_endpoint: config.token_endpoint_override.map(Into::into),
			assertion_file: config.assertion_file,
			assertion_ttl_secs: config.assertion_ttl.whole_seconds(),
			safety_margin_secs: config.safety_margin.whole_seconds(),
		}
	}
}

fn default_authority_host() -> Result<Url, CredentialConfigError> {
	Url::parse(DEFAULT_AUTHORITY_HOST).map_err(|_| CredentialConfigError::InvalidAuthorityHost {
		value: DEFAULT_AUTHORITY_HOST.into(),
	})
}

fn default_assertion_ttl_secs() -> i64 {
	DEFAULT_ASSERTION_TTL.whole_seconds()
}

fn default_safety_margin_secs() -> i64 {
	DEFAULT_SAFETY_MARGIN.whole_seconds()
}

enum UrlDefect {
	HasQuery,
	Insecure,
}

fn check_endpoint_url(url: &Url) -> Result<(), UrlDefect> {
	if url.query().is_some() || url.fragment().is_some() {
		return Err(UrlDefect::HasQuery);
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(UrlDefect::Insecure),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
		Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		None => false,
	}
}
