// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::ConfigError,
	http::Headers,
	sign::{RequestSigner, SigningContext},
};

/// Builds an RFC 7617 `Basic` header value.
///
/// Username and password are joined verbatim; providers in this space compare the raw
/// pair rather than the form-encoded variant from RFC 6749 §2.3.1.
pub fn basic_authorization(username: &str, password: &str) -> String {
	format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// `Authorization: Basic base64(client_id:client_secret)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicAuthSigner;
impl RequestSigner for BasicAuthSigner {
	fn sign(
		&self,
		credential: &Credential,
		_: &SigningContext<'_>,
	) -> Result<Headers, ConfigError> {
		let secret = credential.require_secret()?;

		Ok(Headers::from([(
			"Authorization".into(),
			basic_authorization(&credential.client_id, secret.expose()),
		)]))
	}
}
