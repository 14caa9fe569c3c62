// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	http::{self, Headers},
	normalize::{ErrorNormalizer, ErrorShape},
	provider::ProviderDescriptor,
	retry::{RetryPolicy, RetryPolicyError},
	sign::AuthStrategy,
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, ThisError)]
pub enum ProviderDescriptorError {
	/// Base URL is mandatory.
	#[error("Missing base URL.")]
	MissingBaseUrl,
	/// Base URL must be an absolute http(s) URL that can carry paths.
	#[error("The base URL must be an absolute http(s) URL: {url}.")]
	InvalidBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoints must use HTTPS unless insecure endpoints were explicitly allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Retry policy values are inconsistent.
	#[error("Retry policy is invalid.")]
	InvalidRetryPolicy(#[from] RetryPolicyError),
	/// Timeouts must be positive.
	#[error("Request timeout must be positive.")]
	NonPositiveTimeout,
}

/// Builder for [`ProviderDescriptor`] values.
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Base URL endpoints are resolved against.
	pub base_url: Option<Url>,
	/// How calls are authenticated.
	pub auth: AuthStrategy,
	/// Default retry policy.
	pub retry: RetryPolicy,
	/// Parser for the provider's error envelope.
	pub error_normalizer: Arc<dyn ErrorNormalizer>,
	/// Per-attempt timeout.
	pub timeout: Duration,
	/// Headers sent with every call.
	pub default_headers: Headers,
	/// Accept plain `http` endpoints (local mocks, sandboxes behind TLS terminators).
	pub allow_insecure: bool,
}
impl ProviderDescriptorBuilder {
	/// Default per-attempt timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			base_url: None,
			auth: AuthStrategy::None,
			retry: RetryPolicy::default(),
			error_normalizer: Arc::new(ErrorShape::Auto),
			timeout: Self::DEFAULT_TIMEOUT,
			default_headers: Headers::new(),
			allow_insecure: false,
		}
	}

	/// Sets the base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Sets the auth strategy.
	pub fn auth(mut self, auth: AuthStrategy) -> Self {
		self.auth = auth;

		self
	}

	/// Overrides the default retry policy.
	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Selects one of the built-in error envelope parsers.
	pub fn error_shape(mut self, shape: ErrorShape) -> Self {
		self.error_normalizer = Arc::new(shape);

		self
	}

	/// Installs a custom error envelope parser.
	pub fn error_normalizer(mut self, normalizer: Arc<dyn ErrorNormalizer>) -> Self {
		self.error_normalizer = normalizer;

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Adds a header sent with every call.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name.into(), value.into());

		self
	}

	/// Allows plain `http` endpoints.
	pub fn allow_insecure(mut self, allow: bool) -> Self {
		self.allow_insecure = allow;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let mut base_url = self.base_url.ok_or(ProviderDescriptorError::MissingBaseUrl)?;

		validate_endpoint("base", &base_url, self.allow_insecure)?;

		if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
			return Err(ProviderDescriptorError::InvalidBaseUrl { url: base_url.to_string() });
		}
		// Relative endpoints must extend the base path instead of replacing its last segment.
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}
		if let Some(config) = self.auth.oauth2() {
			validate_endpoint("token", &config.token_url, self.allow_insecure)?;
		}

		self.retry.validate()?;

		if !self.timeout.is_positive() {
			return Err(ProviderDescriptorError::NonPositiveTimeout);
		}

		let mut default_headers = self.default_headers;

		if http::header(&default_headers, "accept").is_none() {
			default_headers.insert("Accept".into(), "application/json".into());
		}

		Ok(ProviderDescriptor {
			id: self.id,
			base_url,
			auth: self.auth,
			retry: self.retry,
			error_normalizer: self.error_normalizer,
			timeout: self.timeout,
			default_headers,
		})
	}
}
impl Debug for ProviderDescriptorBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderDescriptorBuilder")
			.field("id", &self.id)
			.field("base_url", &self.base_url.as_ref().map(Url::as_str))
			.field("auth", &self.auth)
			.field("allow_insecure", &self.allow_insecure)
			.finish_non_exhaustive()
	}
}

fn validate_endpoint(
	name: &'static str,
	url: &Url,
	allow_insecure: bool,
) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_insecure => Ok(()),
		"http" =>
			Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
		_ => Err(ProviderDescriptorError::InvalidBaseUrl { url: url.to_string() }),
	}
}
