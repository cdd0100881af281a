// self
use crate::{_prelude::*, obs::Operation};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type Instrumented<F> = F;

/// Span wrapper used by provider operations.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the operation and the scope-set fingerprint.
	pub fn new(operation: Operation, scope_key: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"workload_credential.operation",
				operation = operation.as_str(),
				scope_key
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, scope_key);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning when a previously read assertion is served after a failed re-read.
pub fn warn_stale_assertion(error: &dyn StdError, age: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			error = %error,
			age_secs = age.whole_seconds(),
			"Assertion re-read failed; reusing the previous assertion."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (error, age);
	}
}

/// Emits a debug event when the token endpoint rejects an assertion and a re-read is forced.
pub fn debug_assertion_rejected(error: &dyn StdError) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(error = %error, "Assertion rejected; forcing a re-read before one retry.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_output_through() {
		let span = OperationSpan::new(Operation::GetToken, "scope-key");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[test]
	fn warnings_accept_any_error() {
		let err = std::io::Error::other("gone");

		warn_stale_assertion(&err, Duration::minutes(7));
		debug_assertion_rejected(&err);
	}
}
