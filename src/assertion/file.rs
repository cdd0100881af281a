// std
use std::io::ErrorKind;
// self
use crate::{
	_prelude::*,
	assertion::{AssertionError, AssertionFuture, AssertionReader},
};

/// Reads the assertion from an orchestrator-mounted file on every call.
#[derive(Clone, Debug)]
pub struct AssertionFileReader {
	path: PathBuf,
}
impl AssertionFileReader {
	/// Creates a reader for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Configured path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read_file(&self) -> Result<String, AssertionError> {
		let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
			if e.kind() == ErrorKind::NotFound {
				AssertionError::Missing { path: self.path.clone() }
			} else {
				AssertionError::Unreadable { path: self.path.clone(), source: Arc::new(e) }
			}
		})?;
		let trimmed = contents.trim_end();

		if trimmed.is_empty() {
			return Err(AssertionError::Empty { path: self.path.clone() });
		}

		Ok(trimmed.to_owned())
	}
}
impl AssertionReader for AssertionFileReader {
	fn read(&self) -> AssertionFuture<'_> {
		Box::pin(self.read_file())
	}
}
