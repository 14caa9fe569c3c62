//! Credential lifecycle, request signing, resilient dispatch, and error normalization for
//! third-party REST APIs that each speak a different authentication dialect.
//!
//! A [`ProviderAdapter`](provider::ProviderAdapter) binds one provider's base URL, auth
//! strategy, credential, and retry policy; every call goes through the
//! [`ResilientHttpClient`](client::ResilientHttpClient), which signs each physical attempt,
//! refreshes OAuth tokens through the shared [`TokenManager`](token::TokenManager), and
//! folds provider error envelopes into a canonical [`ErrorResult`](normalize::ErrorResult).

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod error;
pub mod ext;
pub mod http;
pub mod normalize;
pub mod obs;
pub mod provider;
pub mod retry;
pub mod sign;
pub mod store;
pub mod token;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
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
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
