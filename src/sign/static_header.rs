// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::ConfigError,
	http::Headers,
	sign::{RequestSigner, SigningContext},
};

/// Source of one static header value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "from", content = "value")]
pub enum StaticHeaderValue {
	/// Fixed string from configuration.
	Literal(String),
	/// The credential's client id or API key.
	ClientId,
	/// The credential's client secret.
	ClientSecret,
}

impl StaticHeaderValue {
	/// Resolves the value against `credential`.
	pub fn resolve(&self, credential: &Credential) -> Result<String, ConfigError> {
		Ok(match self {
			Self::Literal(value) => value.clone(),
			Self::ClientId => credential.client_id.clone(),
			Self::ClientSecret => credential.require_secret()?.expose().to_owned(),
		})
	}
}

/// Fixed headers with no per-request computation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticHeaderSigner {
	/// Header name and value source pairs.
	pub headers: Vec<(String, StaticHeaderValue)>,
}
impl StaticHeaderSigner {
	/// Signer sending the client id under `name`, e.g. `X-RapidAPI-Key`.
	pub fn api_key(name: impl Into<String>) -> Self {
		Self::default().with(name, StaticHeaderValue::ClientId)
	}

	/// Adds a header.
	pub fn with(mut self, name: impl Into<String>, value: StaticHeaderValue) -> Self {
		self.headers.push((name.into(), value));

		self
	}
}
impl RequestSigner for StaticHeaderSigner {
	fn sign(
		&self,
		credential: &Credential,
		_: &SigningContext<'_>,
	) -> Result<Headers, ConfigError> {
		self.headers
			.iter()
			.map(|(name, value)| Ok((name.clone(), value.resolve(credential)?)))
			.collect()
	}
}
