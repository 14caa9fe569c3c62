//! Request signing strategies.
//!
//! A [`RequestSigner`] turns a [`Credential`] plus request metadata into authentication
//! headers; [`StaticQuerySigner`] writes API keys into the query string instead. Signers are
//! pure: no I/O and no hidden state, so the dispatch client can call them again for every
//! physical attempt and timestamp-bound signatures are never replayed.

/// HTTP Basic authentication signer.
pub mod basic;
/// Bearer token signer.
pub mod bearer;
/// HMAC/hash signature signer.
pub mod hmac;
/// Static header API key signer.
pub mod static_header;
/// Static query-string API key signer.
pub mod static_query;

pub use basic::*;
pub use bearer::*;
pub use hmac::*;
pub use static_header::*;
pub use static_query::*;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::ConfigError,
	http::{Headers, Method},
	token::OAuth2Config,
};

/// Request metadata a signer may bind its output to.
#[derive(Clone, Copy, Debug)]
pub struct SigningContext<'a> {
	/// HTTP method of the attempt.
	pub method: Method,
	/// Fully resolved URL of the attempt.
	pub url: &'a Url,
	/// Instant the attempt is signed at.
	pub timestamp: OffsetDateTime,
}
impl<'a> SigningContext<'a> {
	/// Creates a context signed at the current instant.
	pub fn now(method: Method, url: &'a Url) -> Self {
		Self { method, url, timestamp: OffsetDateTime::now_utc() }
	}

	/// Overrides the signing instant.
	pub fn at(mut self, timestamp: OffsetDateTime) -> Self {
		self.timestamp = timestamp;

		self
	}
}

/// Computes authentication headers for one outgoing attempt.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Returns the headers to attach; fails only when the credential lacks material.
	fn sign(
		&self,
		credential: &Credential,
		ctx: &SigningContext<'_>,
	) -> Result<Headers, ConfigError>;
}

/// How an adapter authenticates its calls.
#[derive(Clone, Debug, Default)]
pub enum AuthStrategy {
	/// No authentication beyond the credential's static headers.
	#[default]
	None,
	/// `Authorization: Basic` built from `client_id:client_secret`.
	BasicAuth,
	/// API key plus SHA-256 signature over key, secret and timestamp.
	Hmac(HmacSigner),
	/// Fixed headers such as `X-RapidAPI-Key`.
	StaticHeader(StaticHeaderSigner),
	/// Fixed query parameters such as `apikey` or `wskey`.
	StaticQuery(StaticQuerySigner),
	/// Bearer tokens obtained from the configured token endpoint.
	OAuth2(OAuth2Config),
}
impl AuthStrategy {
	/// Returns `true` when calls carry a refreshable bearer token.
	pub fn is_token_based(&self) -> bool {
		matches!(self, Self::OAuth2(_))
	}

	/// Returns the OAuth2 configuration for token-based strategies.
	pub fn oauth2(&self) -> Option<&OAuth2Config> {
		match self {
			Self::OAuth2(config) => Some(config),
			_ => None,
		}
	}

	/// Signs with the strategy's stateless signer.
	///
	/// Token-based strategies return no headers here; the dispatch client attaches the
	/// bearer through [`BearerSigner`] after consulting the token manager.
	pub fn sign(
		&self,
		credential: &Credential,
		ctx: &SigningContext<'_>,
	) -> Result<Headers, ConfigError> {
		match self {
			Self::None | Self::OAuth2(_) | Self::StaticQuery(_) => Ok(Headers::new()),
			Self::BasicAuth => BasicAuthSigner.sign(credential, ctx),
			Self::Hmac(signer) => signer.sign(credential, ctx),
			Self::StaticHeader(signer) => signer.sign(credential, ctx),
		}
	}

	/// Writes query-string credentials into `url`; a no-op for header-based strategies.
	pub fn sign_url(&self, credential: &Credential, url: &mut Url) -> Result<(), ConfigError> {
		match self {
			Self::StaticQuery(signer) => signer.sign_url(credential, url),
			_ => Ok(()),
		}
	}
}
