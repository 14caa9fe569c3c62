//! Token cache with single-flight refresh.
//!
//! [`TokenManager::get_token`] hands out cached tokens while they are outside the safety
//! margin and otherwise performs exactly one token call per [`CacheKey`], no matter how many
//! callers ask concurrently. Waiters queue on a per-key async mutex; when the holder
//! finishes they observe the bumped generation and share its outcome instead of issuing a
//! second call. A failed refresh drops the cached entry so the next call starts from
//! `Unauthenticated`, and the manager never retries on its own.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, TokenState, TokenStatus},
	http::HttpTransport,
	normalize::ErrorResult,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{CacheKey, MemoryStore, TokenStore},
	token::{OAuth2Config, RefreshMetrics, TokenRequest, exchange},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[derive(Debug, Default)]
struct RefreshSlot {
	guard: AsyncMutex<()>,
	in_flight: AtomicBool,
	generation: AtomicU64,
	last_failure: Mutex<Option<ErrorResult>>,
}

// Clears the in-flight flag even when the refreshing future is dropped.
struct InFlight<'a>(&'a AtomicBool);
impl<'a> InFlight<'a> {
	fn enter(flag: &'a AtomicBool) -> Self {
		flag.store(true, Ordering::Release);

		Self(flag)
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

/// Obtains, caches, and refreshes OAuth2 access tokens.
///
/// One manager is typically shared by every adapter of a process through an `Arc`, which
/// makes the underlying [`TokenStore`] the only shared mutable state.
pub struct TokenManager {
	transport: Arc<dyn HttpTransport>,
	store: Arc<dyn TokenStore>,
	timeout: Duration,
	slots: Mutex<HashMap<CacheKey, Arc<RefreshSlot>>>,
	/// Token endpoint counters.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl TokenManager {
	/// Default timeout for one token call.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a manager sending token calls through `transport` and caching in `store`.
	pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn TokenStore>) -> Self {
		Self {
			transport,
			store,
			timeout: Self::DEFAULT_TIMEOUT,
			slots: Default::default(),
			refresh_metrics: Default::default(),
		}
	}

	/// Creates a manager backed by a fresh [`MemoryStore`].
	pub fn in_memory(transport: Arc<dyn HttpTransport>) -> Self {
		Self::new(transport, Arc::new(MemoryStore::default()))
	}

	/// Overrides the timeout applied to token calls.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Returns the token store backing the cache.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Returns a token for `credential`, refreshing it when the cache cannot satisfy
	/// `request`.
	pub async fn get_token(
		&self,
		config: &OAuth2Config,
		credential: &Credential,
		request: TokenRequest,
	) -> Result<AccessToken> {
		let key = CacheKey::new(credential, &request.scope);

		if !request.force {
			if let Some(token) = self.cached(&key, &request).await? {
				return Ok(token);
			}
		}

		let slot = self.slot(&key);
		let observed = slot.generation.load(Ordering::Acquire);
		let _singleflight = slot.guard.lock().await;

		if slot.generation.load(Ordering::Acquire) != observed {
			// Another caller refreshed while this one was queued.
			let failure = slot.last_failure.lock().clone();

			if let Some(failure) = failure {
				return Err(failure.into());
			}

			let shared = TokenRequest { force: false, ..request.clone() };

			if let Some(token) = self.cached(&key, &shared).await? {
				return Ok(token);
			}
		}
		if let Some(token) = self.cached(&key, &request).await? {
			return Ok(token);
		}

		self.refresh(config, credential, &key, &slot).await
	}

	/// Reports the lifecycle state of the cache entry `request` maps to.
	pub async fn state(
		&self,
		credential: &Credential,
		request: &TokenRequest,
	) -> Result<TokenState> {
		let key = CacheKey::new(credential, &request.scope);
		let in_flight = self
			.slots
			.lock()
			.get(&key)
			.is_some_and(|slot| slot.in_flight.load(Ordering::Acquire));

		if in_flight {
			return Ok(TokenState::Authenticating);
		}

		let state = match self.store.fetch(&key).await? {
			None => TokenState::Unauthenticated,
			Some(token) => match token.status_at(OffsetDateTime::now_utc(), request.safety_margin) {
				TokenStatus::Valid => TokenState::Valid,
				TokenStatus::Expired => TokenState::Expired,
			},
		};

		Ok(state)
	}

	/// Drops the cached token `request` maps to, returning it.
	pub async fn invalidate(
		&self,
		credential: &Credential,
		request: &TokenRequest,
	) -> Result<Option<AccessToken>> {
		let key = CacheKey::new(credential, &request.scope);

		Ok(self.store.remove(&key).await?)
	}

	async fn cached(&self, key: &CacheKey, request: &TokenRequest) -> Result<Option<AccessToken>> {
		let now = OffsetDateTime::now_utc();
		let token = self.store.fetch(key).await?.filter(|token| request.accepts(token, now));

		if token.is_some() {
			self.refresh_metrics.record_cache_hit();
		}

		Ok(token)
	}

	async fn refresh(
		&self,
		config: &OAuth2Config,
		credential: &Credential,
		key: &CacheKey,
		slot: &RefreshSlot,
	) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::TokenRefresh;

		let span = OpSpan::new(KIND, "refresh");
		let _in_flight = InFlight::enter(&slot.in_flight);

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(exchange::request_token(
				self.transport.as_ref(),
				config,
				credential,
				self.timeout,
			))
			.await;
		let result = match result {
			Ok(token) => match self.store.save(key.clone(), token.clone()).await {
				Ok(()) => Ok(token),
				Err(e) => Err(e.into()),
			},
			Err(e) => Err(e),
		};

		match &result {
			Ok(_) => {
				*slot.last_failure.lock() = None;

				self.refresh_metrics.record_success();
				obs::record_op_outcome(KIND, OpOutcome::Success);
			},
			Err(e) => {
				// The exchange failure is what callers need; a failed eviction changes nothing.
				let _ = self.store.remove(key).await;

				*slot.last_failure.lock() = e.as_api().cloned();

				self.refresh_metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		slot.generation.fetch_add(1, Ordering::AcqRel);

		result
	}

	fn slot(&self, key: &CacheKey) -> Arc<RefreshSlot> {
		self.slots.lock().entry(key.clone()).or_default().clone()
	}
}
#[cfg(feature = "reqwest")]
impl Default for TokenManager {
	fn default() -> Self {
		Self::in_memory(Arc::new(ReqwestTransport::default()))
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("timeout", &self.timeout)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}
