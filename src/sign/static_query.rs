// self
use crate::{_prelude::*, auth::Credential, error::ConfigError, sign::StaticHeaderValue};

/// API keys carried in the query string, e.g. `?apikey=...` or `?wskey=...`.
///
/// Parameters are appended to the URL of every attempt; an existing parameter with the same
/// name is replaced rather than duplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticQuerySigner {
	/// Parameter name and value source pairs.
	pub params: Vec<(String, StaticHeaderValue)>,
}
impl StaticQuerySigner {
	/// Signer sending the client id under `name`.
	pub fn api_key(name: impl Into<String>) -> Self {
		Self::default().with(name, StaticHeaderValue::ClientId)
	}

	/// Adds a parameter.
	pub fn with(mut self, name: impl Into<String>, value: StaticHeaderValue) -> Self {
		self.params.push((name.into(), value));

		self
	}

	/// Writes the parameters into `url`.
	pub fn sign_url(&self, credential: &Credential, url: &mut Url) -> Result<(), ConfigError> {
		if self.params.is_empty() {
			return Ok(());
		}

		let mut resolved = Vec::with_capacity(self.params.len());

		for (name, value) in &self.params {
			resolved.push((name.as_str(), value.resolve(credential)?));
		}

		let kept = url
			.query_pairs()
			.filter(|(name, _)| resolved.iter().all(|(signed, _)| *signed != name.as_ref()))
			.map(|(name, value)| (name.into_owned(), value.into_owned()))
			.collect::<Vec<_>>();
		let mut pairs = url.query_pairs_mut();

		pairs.clear();
		pairs.extend_pairs(kept);
		pairs.extend_pairs(resolved);

		Ok(())
	}
}
