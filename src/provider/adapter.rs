//! Composition root binding one provider descriptor to a credential.

// crates.io
use serde_json::Value;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	client::{Auth, Request, ResilientHttpClient, Response},
	error::ConfigError,
	ext::RateLimitPolicy,
	http::{Headers, HttpTransport, Method},
	provider::ProviderDescriptor,
	retry::RetryPolicy,
	token::TokenManager,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	/// Absolute deadline for the whole call, backoff included.
	pub deadline: Option<Instant>,
	/// Retry policy replacing the descriptor's default.
	pub retry: Option<RetryPolicy>,
	/// Extra headers for this call.
	pub headers: Headers,
}
impl CallOptions {
	/// Gives up once `deadline` passes.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Gives up once `budget` has elapsed from now.
	pub fn within(self, budget: std::time::Duration) -> Self {
		self.with_deadline(Instant::now() + budget)
	}

	/// Replaces the retry policy for this call.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = Some(retry);

		self
	}

	/// Adds a header for this call.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}
}

/// Single entry point for calling one external API.
///
/// Adapters are cheap to clone and share their [`TokenManager`], so every adapter built
/// from the same manager reuses the same token cache.
#[derive(Clone, Debug)]
pub struct ProviderAdapter {
	descriptor: ProviderDescriptor,
	credential: Credential,
	client: ResilientHttpClient,
}
impl ProviderAdapter {
	/// Creates an adapter sending through `transport` and refreshing tokens through `tokens`.
	pub fn with_transport(
		descriptor: ProviderDescriptor,
		credential: Credential,
		transport: Arc<dyn HttpTransport>,
		tokens: Arc<TokenManager>,
	) -> Result<Self> {
		if credential.provider != descriptor.id {
			return Err(ConfigError::CredentialMismatch {
				provider: descriptor.id.to_string(),
				credential: credential.provider.to_string(),
			}
			.into());
		}

		let client = ResilientHttpClient::new(transport, tokens)
			.with_normalizer(descriptor.error_normalizer.clone())
			.with_timeout(descriptor.timeout);

		Ok(Self { descriptor, credential, client })
	}

	/// Consults `policy` before every physical send.
	pub fn with_rate_limit(mut self, policy: Arc<dyn RateLimitPolicy>) -> Self {
		self.client = self.client.with_rate_limit(policy);

		self
	}

	/// Returns the descriptor the adapter was built from.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Returns the bound credential.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Returns the shared token manager.
	pub fn tokens(&self) -> &Arc<TokenManager> {
		self.client.tokens()
	}

	/// Calls `endpoint` and decodes the JSON response.
	pub async fn call(
		&self,
		endpoint: &str,
		method: Method,
		query: &[(&str, &str)],
		body: Option<&Value>,
	) -> Result<Value> {
		self.call_with(endpoint, method, query, body, &CallOptions::default()).await
	}

	/// [`call`](Self::call) with per-call overrides.
	pub async fn call_with(
		&self,
		endpoint: &str,
		method: Method,
		query: &[(&str, &str)],
		body: Option<&Value>,
		options: &CallOptions,
	) -> Result<Value> {
		self.send(endpoint, method, query, body, options).await?.json()
	}

	/// Executes the call and returns the raw successful response.
	pub async fn send(
		&self,
		endpoint: &str,
		method: Method,
		query: &[(&str, &str)],
		body: Option<&Value>,
		options: &CallOptions,
	) -> Result<Response> {
		let mut request = self.request(endpoint, method, query, body)?;

		request.headers.extend(options.headers.clone());

		let auth = Auth { strategy: &self.descriptor.auth, credential: &self.credential };
		let retry = match &options.retry {
			Some(retry) => {
				retry.validate().map_err(ConfigError::InvalidRetryOverride)?;

				retry
			},
			None => &self.descriptor.retry,
		};

		self.client.execute_until(&request, auth, retry, options.deadline).await
	}

	/// Resolves `endpoint` against the base URL and encodes the body.
	///
	/// Relative endpoints extend the base path. Absolute http(s) URLs are used verbatim but
	/// must share the base URL's scheme, host and port, so credentials never leave the
	/// provider's origin.
	pub fn request(
		&self,
		endpoint: &str,
		method: Method,
		query: &[(&str, &str)],
		body: Option<&Value>,
	) -> Result<Request> {
		let base = &self.descriptor.base_url;
		let invalid = |source| ConfigError::InvalidEndpoint { endpoint: endpoint.into(), source };
		let mut url = match Url::parse(endpoint) {
			Ok(url) if matches!(url.scheme(), "http" | "https") => {
				if url.origin() != base.origin() {
					return Err(ConfigError::ForeignEndpoint {
						endpoint: endpoint.into(),
						origin: base.origin().ascii_serialization(),
					}
					.into());
				}

				url
			},
			_ => base.join(endpoint.trim_start_matches('/')).map_err(invalid)?,
		};

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}

		let mut request = Request::new(method, url);

		request.headers.extend(self.descriptor.default_headers.clone());

		if let Some(body) = body {
			let encoded = serde_json::to_vec(body).map_err(ConfigError::RequestEncode)?;

			request = request.with_header("Content-Type", "application/json").with_body(encoded);
		}

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl ProviderAdapter {
	/// Creates an adapter with its own reqwest transport and in-memory token cache.
	pub fn new(descriptor: ProviderDescriptor, credential: Credential) -> Result<Self> {
		let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::default());
		let tokens = Arc::new(TokenManager::in_memory(transport.clone()));

		Self::with_transport(descriptor, credential, transport, tokens)
	}
}
