// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential},
	error::ConfigError,
	http::Headers,
	sign::{RequestSigner, SigningContext},
};

/// Attaches a token snapshot as `Authorization: <token_type> <value>`.
#[derive(Clone, Debug)]
pub struct BearerSigner<'a>(pub &'a AccessToken);
impl RequestSigner for BearerSigner<'_> {
	fn sign(&self, _: &Credential, _: &SigningContext<'_>) -> Result<Headers, ConfigError> {
		Ok(Headers::from([("Authorization".into(), self.0.authorization())]))
	}
}
