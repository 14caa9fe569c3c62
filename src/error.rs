//! Crate-level error types shared by signers, the token manager, and the dispatch client.

// self
use crate::{
	_prelude::*,
	auth::ScopeValidationError,
	normalize::{ErrorKind, ErrorResult},
	provider::ProviderDescriptorError,
	retry::RetryPolicyError,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Expected provider failures arrive as [`Error::Api`] carrying a normalized
/// [`ErrorResult`]; everything else is a local problem the caller has to fix.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Provider or transport failure mapped into the canonical taxonomy.
	#[error(transparent)]
	Api(#[from] ErrorResult),
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token cache failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Caller-supplied deadline elapsed before the call completed.
	#[error("Call deadline elapsed before the provider answered.")]
	DeadlineExceeded,
}
impl Error {
	/// Returns the normalized provider failure, if this is one.
	pub fn as_api(&self) -> Option<&ErrorResult> {
		match self {
			Self::Api(result) => Some(result),
			_ => None,
		}
	}

	/// Returns the [`ErrorKind`] for provider failures.
	pub fn kind(&self) -> Option<ErrorKind> {
		self.as_api().map(|result| result.kind)
	}

	/// Returns `true` when the failure is worth retrying later.
	pub fn is_retryable(&self) -> bool {
		self.as_api().is_some_and(|result| result.retryable)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Credential lacks material required by the configured auth strategy.
	#[error("Credential for `{provider}` is missing the {field} field.")]
	MissingCredential {
		/// Provider identifier string.
		provider: String,
		/// Name of the missing credential field.
		field: &'static str,
	},
	/// Credential was issued for a different provider than the adapter serves.
	#[error("Credential for `{credential}` cannot be used with provider `{provider}`.")]
	CredentialMismatch {
		/// Provider the adapter is bound to.
		provider: String,
		/// Provider recorded on the credential.
		credential: String,
	},
	/// Endpoint path or query could not be turned into a URL.
	#[error("Endpoint `{endpoint}` cannot be resolved into a URL.")]
	InvalidEndpoint {
		/// Endpoint string supplied by the caller.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Absolute endpoint points outside the provider's base origin.
	#[error("Endpoint `{endpoint}` is outside the provider origin `{origin}`.")]
	ForeignEndpoint {
		/// Endpoint string supplied by the caller.
		endpoint: String,
		/// Scheme, host and port of the descriptor's base URL.
		origin: String,
	},
	/// Per-call retry override failed validation.
	#[error("Retry policy override is invalid.")]
	InvalidRetryOverride(#[source] RetryPolicyError),
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] ProviderDescriptorError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),
	/// Request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	RequestEncode(#[source] serde_json::Error),
	/// Transport rejected the request before sending it (bad header name, bad URL).
	#[error("HTTP request could not be constructed.")]
	RequestBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Shorthand for [`ConfigError::MissingCredential`].
	pub fn missing_credential(provider: impl Display, field: &'static str) -> Self {
		Self::MissingCredential { provider: provider.to_string(), field }
	}

	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures to obtain any response from an [`HttpTransport`](crate::http::HttpTransport).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The per-attempt timeout elapsed.
	#[error("Request timed out while calling the provider.")]
	Timeout,
	/// Request could not be built by the transport.
	#[error("HTTP request could not be constructed.")]
	Build {
		/// Transport-specific builder error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Converts the failure into the error surfaced to callers.
	///
	/// Builder failures are local mistakes and become [`ConfigError::RequestBuild`]; every
	/// other variant is a retryable [`ErrorKind::NetworkError`].
	pub fn into_error(self) -> Error {
		match self {
			Self::Build { source } => ConfigError::RequestBuild { source }.into(),
			Self::Timeout => ErrorResult::timeout().into(),
			other => ErrorResult::network(other.to_string()).into(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::Build { source: Box::new(e) }
		} else if e.is_timeout() {
			Self::Timeout
		} else {
			Self::network(e)
		}
	}
}
