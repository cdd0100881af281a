//! Optional observability helpers for credential operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `workload_credential.operation` with the
//!   `operation` and `scope_key` fields, plus warnings when a stale assertion is reused.
//! - Enable `metrics` to increment the `workload_credential_operation_total` counter for every
//!   recorded outcome, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Caller-facing token acquisition.
	GetToken,
	/// Reading the assertion from its source.
	ReadAssertion,
	/// Exchanging the assertion at the token endpoint.
	Exchange,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::GetToken => "get_token",
			Operation::ReadAssertion => "read_assertion",
			Operation::Exchange => "exchange",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Served from a cache without I/O.
	CacheHit,
	/// Resolved by another caller's in-flight refresh.
	Coalesced,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::CacheHit => "cache_hit",
			Outcome::Coalesced => "coalesced",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
