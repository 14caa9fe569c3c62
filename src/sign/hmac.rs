// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::ConfigError,
	http::Headers,
	sign::{RequestSigner, SigningContext},
};

/// Hex SHA-256 over `api_key ∥ secret ∥ unix_seconds`.
pub fn hmac_signature(api_key: &str, secret: &str, unix_seconds: i64) -> String {
	let mut hasher = Sha256::new();

	hasher.update(api_key.as_bytes());
	hasher.update(secret.as_bytes());
	hasher.update(unix_seconds.to_string().as_bytes());

	hex::encode(hasher.finalize())
}

/// Timestamp-bound API key signature used by hotel wholesalers.
///
/// The signature only has a few minutes of validity on the provider side, so it is
/// recomputed for every attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmacSigner {
	/// Header carrying the API key.
	pub key_header: String,
	/// Header carrying the hex signature.
	pub signature_header: String,
	/// Optional header echoing the signing timestamp.
	pub timestamp_header: Option<String>,
}
impl HmacSigner {
	/// Overrides the key and signature header names.
	pub fn with_headers(
		mut self,
		key_header: impl Into<String>,
		signature_header: impl Into<String>,
	) -> Self {
		self.key_header = key_header.into();
		self.signature_header = signature_header.into();

		self
	}

	/// Also emits the signing timestamp under `name`.
	pub fn with_timestamp_header(mut self, name: impl Into<String>) -> Self {
		self.timestamp_header = Some(name.into());

		self
	}
}
impl Default for HmacSigner {
	fn default() -> Self {
		Self {
			key_header: "Api-key".into(),
			signature_header: "X-Signature".into(),
			timestamp_header: None,
		}
	}
}
impl RequestSigner for HmacSigner {
	fn sign(
		&self,
		credential: &Credential,
		ctx: &SigningContext<'_>,
	) -> Result<Headers, ConfigError> {
		let secret = credential.require_secret()?;
		let unix_seconds = ctx.timestamp.unix_timestamp();
		let mut headers = Headers::new();

		headers.insert(self.key_header.clone(), credential.client_id.clone());
		headers.insert(
			self.signature_header.clone(),
			hmac_signature(&credential.client_id, secret.expose(), unix_seconds),
		);

		if let Some(name) = &self.timestamp_header {
			headers.insert(name.clone(), unix_seconds.to_string());
		}

		Ok(headers)
	}
}
