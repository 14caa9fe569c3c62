//! Token cache contract and the built-in in-memory backend.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, ProviderId, ScopeSet},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend for cached access tokens.
///
/// The token manager is the only writer; implementations only need last-write-wins
/// semantics per key.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the token cached under `key`.
	fn save(&self, key: CacheKey, token: AccessToken) -> StoreFuture<'_, ()>;

	/// Fetches the token cached under `key`, if present.
	fn fetch<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<AccessToken>>;

	/// Drops the token cached under `key`, returning it.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<AccessToken>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Identifies one cached token: provider, account, and requested scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Provider the token was issued by.
	pub provider: ProviderId,
	/// [`Credential::fingerprint`] of the account.
	pub credential_fingerprint: String,
	/// [`ScopeSet::fingerprint`] of the requested scope.
	pub scope_fingerprint: String,
}
impl CacheKey {
	/// Builds the key for `credential` requesting `scope`.
	pub fn new(credential: &Credential, scope: &ScopeSet) -> Self {
		Self {
			provider: credential.provider.clone(),
			credential_fingerprint: credential.fingerprint(),
			scope_fingerprint: scope.fingerprint(),
		}
	}
}
