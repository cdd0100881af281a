//! Federated workload identity credentials: exchange a platform-mounted JWT assertion for
//! OAuth 2.0 access tokens that stay cached, fresh, and single-flight under concurrent load.
//!
//! The entry point is [`CredentialProvider::get_token`]. Everything else (assertion caching,
//! the token exchange, the access-token cache) is exposed so callers can compose or test the
//! pieces individually.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod assertion;
pub mod auth;
pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod provider;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use config::CredentialConfig;
pub use error::{Error, Result};
pub use provider::CredentialProvider;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
