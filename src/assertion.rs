//! Sources of the signed assertion and the TTL cache in front of them.
//!
//! The orchestrator rotates the assertion file on its own schedule, so readers never cache;
//! [`AssertionCache`] decides how often the source is actually touched.

mod cache;
mod file;

pub use cache::AssertionCache;
pub use file::AssertionFileReader;

// std
use std::io;
// self
use crate::_prelude::*;

/// Boxed future returned by [`AssertionReader::read`].
pub type AssertionFuture<'a> =
	Pin<Box<dyn Future<Output = Result<String, AssertionError>> + 'a + Send>>;

/// Source of the current signed assertion.
pub trait AssertionReader
where
	Self: Send + Sync,
{
	/// Reads the current assertion value, without caching.
	fn read(&self) -> AssertionFuture<'_>;
}

/// Failures raised while loading the assertion.
#[derive(Clone, Debug, ThisError)]
pub enum AssertionError {
	/// The assertion file does not exist.
	#[error("Assertion file {} does not exist.", path.display())]
	Missing {
		/// Configured path.
		path: PathBuf,
	},
	/// The assertion file exists but could not be read as UTF-8 text.
	#[error("Assertion file {} could not be read.", path.display())]
	Unreadable {
		/// Configured path.
		path: PathBuf,
		/// Underlying I/O failure.
		#[source]
		source: Arc<io::Error>,
	},
	/// The assertion file holds nothing but whitespace.
	#[error("Assertion file {} is empty.", path.display())]
	Empty {
		/// Configured path.
		path: PathBuf,
	},
}
impl AssertionError {
	/// Path of the assertion source that failed.
	pub fn path(&self) -> &Path {
		match self {
			Self::Missing { path } | Self::Unreadable { path, .. } | Self::Empty { path } => path,
		}
	}
}
