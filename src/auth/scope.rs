//! Requested scope sets and the canonical keys used to cache tokens per scope set.

// std
use std::{collections::BTreeSet, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Order-independent set of OAuth scopes.
///
/// Entries are deduplicated and sorted on construction, so `["b", "a"]` and `["a", "b", "a"]`
/// compare equal and share one [`ScopeKey`]. For Entra ID client-credentials requests each entry
/// is usually a `resource-uri/.default` string.
#[derive(Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	key: OnceLock<ScopeKey>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self { scopes: set.into_iter().collect(), key: OnceLock::new() })
	}

	/// Convenience constructor for the common single `resource/.default` request.
	pub fn single(scope: impl Into<String>) -> Result<Self, ScopeValidationError> {
		Self::new([scope])
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(String::as_str)
	}

	/// Space-delimited form used for the `scope` request parameter.
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Canonical cache key for this set; computed once and reused.
	pub fn key(&self) -> &ScopeKey {
		self.key.get_or_init(|| ScopeKey::derive(&self.scopes))
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { scopes: self.scopes.clone(), key: self.key.clone() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key().hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(self.scopes.iter())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

/// Stable fingerprint of a normalized [`ScopeSet`].
///
/// The key is the unpadded URL-safe base64 SHA-256 digest of the space-joined scopes, so it is
/// independent of input order and safe to embed in labels.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey(String);
impl ScopeKey {
	fn derive(scopes: &[String]) -> Self {
		let digest = Sha256::digest(scopes.join(" ").as_bytes());

		Self(URL_SAFE_NO_PAD.encode(digest))
	}

	/// Borrows the fingerprint string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ScopeKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
