//! Validated identifiers for the workload's application and directory.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate($kind, view)?;

				Ok(Self(view.to_owned()))
			}

			/// Borrows the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 256;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (client, tenant).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (client, tenant).
		kind: &'static str,
	},
	/// The identifier contains a path separator and would corrupt the authority URL.
	#[error("{kind} identifier contains a path separator.")]
	ContainsSeparator {
		/// Kind of identifier (client, tenant).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed byte length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (client, tenant).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

def_id! { ClientId, "Application (client) identifier of the federated workload identity.", "Client" }
def_id! { TenantId, "Directory (tenant) identifier the identity is registered in.", "Tenant" }

fn validate(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.contains(['/', '\\', '?', '#']) {
		return Err(IdentifierError::ContainsSeparator { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_separators() {
		assert!(TenantId::new(" contoso").is_err());
		assert!(ClientId::new("").is_err());
		assert!(TenantId::new("contoso/../common").is_err());

		let tenant = TenantId::new("72f988bf-86f1-41af-91ab-2d7cd011db47")
			.expect("GUID tenant fixture should be valid.");

		assert_eq!(tenant.as_str(), "72f988bf-86f1-41af-91ab-2d7cd011db47");
		assert_eq!(format!("{tenant:?}"), "Tenant(72f988bf-86f1-41af-91ab-2d7cd011db47)");
	}

	#[test]
	fn serde_enforces_validation() {
		let client: ClientId = serde_json::from_str("\"0000-client\"")
			.expect("Client identifier should deserialize successfully.");

		assert_eq!(client.as_ref(), "0000-client");
		assert!(serde_json::from_str::<ClientId>("\"with space\"").is_err());
	}

	#[test]
	fn length_limit_is_inclusive() {
		TenantId::new("t".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		let err = TenantId::new("t".repeat(IDENTIFIER_MAX_LEN + 1))
			.expect_err("Overlong identifiers must be rejected.");

		assert_eq!(err, IdentifierError::TooLong { kind: "Tenant", max: IDENTIFIER_MAX_LEN });
	}
}
