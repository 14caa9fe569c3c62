//! Resilient dispatch: per-attempt signing, retry with backoff, and one-shot token refresh.
//!
//! Every physical attempt is built from scratch: the bearer is looked up again, stateless
//! signers run again with a fresh timestamp, and the rate limit policy is consulted again.
//! Failures are classified by the configured [`ErrorNormalizer`] and then
//!
//! - `Unauthorized` with a bearer attached forces one token refresh and resends without
//!   touching the generic budget; a second `Unauthorized` is terminal,
//! - failures accepted by [`RetryPolicy::should_retry`] wait for the backoff delay and try
//!   again until `max_attempts` is spent,
//! - anything else is returned as-is.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{self as tokio_time, Instant};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential},
	ext::{RateLimitContext, RateLimitDecision, RateLimitPolicy},
	http::{self, Headers, HttpTransport, Method, SignedRequest},
	normalize::{ErrorKind, ErrorNormalizer, ErrorResult, ErrorShape},
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::RetryPolicy,
	sign::{AuthStrategy, BearerSigner, RequestSigner, SigningContext},
	token::{TokenManager, TokenRequest},
};

/// Logical request, re-signed for every physical attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
	/// HTTP method.
	pub method: Method,
	/// Fully resolved URL including the query string.
	pub url: Url,
	/// Non-auth headers.
	pub headers: Headers,
	/// Encoded body.
	pub body: Option<Vec<u8>>,
}
impl Request {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Headers::new(), body: None }
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Sets the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}
}

/// Authentication inputs for a call.
#[derive(Clone, Copy, Debug)]
pub struct Auth<'a> {
	/// Strategy selecting the signer.
	pub strategy: &'a AuthStrategy,
	/// Credential the signer reads from.
	pub credential: &'a Credential,
}

/// Successful provider response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
	/// HTTP status (2xx).
	pub status: u16,
	/// Response headers with lower-cased names.
	pub headers: Headers,
	/// Raw body bytes.
	pub body: Vec<u8>,
	/// Physical sends it took, including refresh resends.
	pub attempts: u32,
}
impl Response {
	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		http::header(&self.headers, name)
	}

	/// Decodes the body as JSON; an empty body decodes to `null`.
	pub fn json(&self) -> Result<Value> {
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Value::Null);
		}

		self.parse()
	}

	/// Decodes the body into `T`.
	pub fn parse<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		serde_json::from_slice(&self.body).map_err(|e| {
			ErrorResult::terminal(
				ErrorKind::Unknown,
				format!("Provider returned a body that is not valid JSON: {e}."),
			)
			.with_status(self.status)
			.into()
		})
	}
}

enum Attempt {
	Done(Response),
	Failed { result: ErrorResult, bearer: Option<AccessToken> },
}

/// Executes authenticated requests with timeout, retry, and backoff.
#[derive(Clone)]
pub struct ResilientHttpClient {
	transport: Arc<dyn HttpTransport>,
	tokens: Arc<TokenManager>,
	normalizer: Arc<dyn ErrorNormalizer>,
	timeout: Duration,
	rate_limit: Option<Arc<dyn RateLimitPolicy>>,
}
impl ResilientHttpClient {
	/// Default per-attempt timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a client sending through `transport` and refreshing through `tokens`.
	pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenManager>) -> Self {
		Self {
			transport,
			tokens,
			normalizer: Arc::new(ErrorShape::Auto),
			timeout: Self::DEFAULT_TIMEOUT,
			rate_limit: None,
		}
	}

	/// Replaces the error envelope parser.
	pub fn with_normalizer(mut self, normalizer: Arc<dyn ErrorNormalizer>) -> Self {
		self.normalizer = normalizer;

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Consults `policy` before every physical send.
	pub fn with_rate_limit(mut self, policy: Arc<dyn RateLimitPolicy>) -> Self {
		self.rate_limit = Some(policy);

		self
	}

	/// Returns the token manager used for bearer strategies.
	pub fn tokens(&self) -> &Arc<TokenManager> {
		&self.tokens
	}

	/// Executes `request` under `policy`.
	pub async fn execute(
		&self,
		request: &Request,
		auth: Auth<'_>,
		policy: &RetryPolicy,
	) -> Result<Response> {
		self.execute_until(request, auth, policy, None).await
	}

	/// Executes `request` under `policy`, giving up at `deadline`.
	///
	/// The deadline covers sends, token calls, and backoff sleeps alike.
	pub async fn execute_until(
		&self,
		request: &Request,
		auth: Auth<'_>,
		policy: &RetryPolicy,
		deadline: Option<Instant>,
	) -> Result<Response> {
		const KIND: OpKind = OpKind::Dispatch;

		let span = OpSpan::new(KIND, "execute");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let run = span.instrument(self.run(request, auth, policy));
		let result = match deadline {
			Some(deadline) => tokio_time::timeout_at(deadline, run)
				.await
				.unwrap_or(Err(Error::DeadlineExceeded)),
			None => run.await,
		};

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn run(
		&self,
		request: &Request,
		auth: Auth<'_>,
		policy: &RetryPolicy,
	) -> Result<Response> {
		let mut attempt = 1;
		let mut sends = 0;
		let mut refreshed = false;
		let mut rejected = None;

		loop {
			let (result, bearer) =
				match self.attempt(request, auth, rejected.take(), attempt, &mut sends).await? {
					Attempt::Done(response) => return Ok(response),
					Attempt::Failed { result, bearer } => (result, bearer),
				};

			if result.kind == ErrorKind::Unauthorized {
				match bearer {
					Some(token) if !refreshed => {
						obs::refresh_on_unauthorized(attempt);

						refreshed = true;
						rejected = Some(token);

						continue;
					},
					_ => return Err(result.exhausted().into()),
				}
			}
			if !policy.should_retry(&result) {
				return Err(result.into());
			}
			if attempt >= policy.max_attempts {
				return Err(result.exhausted().into());
			}

			let delay = policy.next_delay(attempt, result.retry_after);

			obs::retry_scheduled(attempt, delay, &result);
			obs::record_op_outcome(OpKind::Dispatch, OpOutcome::Retry);
			tokio_time::sleep(delay.unsigned_abs()).await;

			attempt += 1;
		}
	}

	async fn attempt(
		&self,
		request: &Request,
		auth: Auth<'_>,
		rejected: Option<AccessToken>,
		attempt: u32,
		sends: &mut u32,
	) -> Result<Attempt> {
		let bearer = match auth.strategy.oauth2() {
			Some(config) => {
				let token_request = match &rejected {
					Some(token) => TokenRequest::for_config(config).rejecting(token),
					None => TokenRequest::for_config(config),
				};

				match self.tokens.get_token(config, auth.credential, token_request).await {
					Ok(token) => Some(token),
					Err(Error::Api(result)) =>
						return Ok(Attempt::Failed { result, bearer: None }),
					Err(e) => return Err(e),
				}
			},
			None => None,
		};

		self.throttle(auth, request, attempt).await?;

		let signed = self.sign(request, auth, bearer.as_ref())?;

		*sends += 1;

		let response = match self.transport.send(signed, self.timeout).await {
			Ok(response) => response,
			Err(e) => match e.into_error() {
				Error::Api(result) => return Ok(Attempt::Failed { result, bearer }),
				other => return Err(other),
			},
		};

		if response.is_success() {
			return Ok(Attempt::Done(Response {
				status: response.status,
				headers: response.headers,
				body: response.body,
				attempts: *sends,
			}));
		}

		let result = self
			.normalizer
			.normalize(response.status, &response.body)
			.with_retry_after(response.retry_after());

		Ok(Attempt::Failed { result, bearer })
	}

	fn sign(
		&self,
		request: &Request,
		auth: Auth<'_>,
		bearer: Option<&AccessToken>,
	) -> Result<SignedRequest> {
		let mut url = request.url.clone();

		auth.strategy.sign_url(auth.credential, &mut url)?;

		let ctx = SigningContext::now(request.method, &url);
		let mut headers = request.headers.clone();

		headers.extend(auth.credential.headers.clone());
		headers.extend(auth.strategy.sign(auth.credential, &ctx)?);

		if let Some(token) = bearer {
			headers.extend(BearerSigner(token).sign(auth.credential, &ctx)?);
		}

		Ok(SignedRequest { method: request.method, url, headers, body: request.body.clone() })
	}

	async fn throttle(&self, auth: Auth<'_>, request: &Request, attempt: u32) -> Result<()> {
		let Some(policy) = &self.rate_limit else {
			return Ok(());
		};
		let ctx = RateLimitContext::new(
			auth.credential.provider.clone(),
			request.method,
			request.url.path(),
			attempt,
		);

		if let RateLimitDecision::Delay(directive) = policy.evaluate(&ctx).await? {
			tokio_time::sleep(directive.recommended_backoff.unsigned_abs()).await;
		}

		Ok(())
	}
}
impl Debug for ResilientHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResilientHttpClient")
			.field("tokens", &self.tokens)
			.field("timeout", &self.timeout)
			.field("rate_limited", &self.rate_limit.is_some())
			.finish_non_exhaustive()
	}
}
