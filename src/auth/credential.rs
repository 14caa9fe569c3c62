//! Per-provider credentials and the store that hands them to adapters.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, Secret},
	error::ConfigError,
};

/// Secrets for one provider account.
///
/// `client_id` doubles as the API key for signing schemes that only know a key/secret
/// pair. The value is immutable once loaded; rotate by building a new credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Provider the credential belongs to.
	pub provider: ProviderId,
	/// OAuth client identifier or API key.
	pub client_id: String,
	/// OAuth client secret or signing secret.
	#[serde(default)]
	pub client_secret: Option<Secret>,
	/// Resource-owner username for password grants.
	#[serde(default)]
	pub username: Option<String>,
	/// Resource-owner password for password grants.
	#[serde(default)]
	pub password: Option<Secret>,
	/// Extra headers sent with every request (affiliate ids, partner codes).
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
}
impl Credential {
	/// Creates a credential carrying only a client id or API key.
	pub fn new(provider: ProviderId, client_id: impl Into<String>) -> Self {
		Self {
			provider,
			client_id: client_id.into(),
			client_secret: None,
			username: None,
			password: None,
			headers: BTreeMap::new(),
		}
	}

	/// Attaches the client or signing secret.
	pub fn with_client_secret(mut self, secret: impl Into<Secret>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Attaches resource-owner credentials for password grants.
	pub fn with_user(mut self, username: impl Into<String>, password: impl Into<Secret>) -> Self {
		self.username = Some(username.into());
		self.password = Some(password.into());

		self
	}

	/// Adds a static header sent with every request.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Returns the client secret or a [`ConfigError::MissingCredential`].
	pub fn require_secret(&self) -> Result<&Secret, ConfigError> {
		self.client_secret
			.as_ref()
			.ok_or_else(|| ConfigError::missing_credential(&self.provider, "client_secret"))
	}

	/// Stable digest that separates token cache entries of different accounts.
	///
	/// Only identifying fields participate, so rotating a secret keeps the cache entry.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.provider.as_bytes());
		hasher.update([0]);
		hasher.update(self.client_id.as_bytes());
		hasher.update([0]);
		hasher.update(self.username.as_deref().unwrap_or_default().as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}

	/// Loads a credential from `{PREFIX}_CLIENT_ID`, `{PREFIX}_CLIENT_SECRET`,
	/// `{PREFIX}_USERNAME`, and `{PREFIX}_PASSWORD` environment variables.
	pub fn from_env(provider: ProviderId, prefix: &str) -> Result<Self, ConfigError> {
		Self::from_lookup(provider, prefix, |name| std::env::var(name).ok())
	}

	/// Same as [`Credential::from_env`] but reads values through `lookup`.
	pub fn from_lookup<F>(
		provider: ProviderId,
		prefix: &str,
		lookup: F,
	) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let read = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());
		let client_id = read("CLIENT_ID")
			.ok_or_else(|| ConfigError::missing_credential(&provider, "client_id"))?;
		let mut credential = Self::new(provider, client_id);

		credential.client_secret = read("CLIENT_SECRET").map(Secret::from);
		credential.username = read("USERNAME");
		credential.password = read("PASSWORD").map(Secret::from);

		Ok(credential)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("provider", &self.provider)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("username", &self.username)
			.field("password_set", &self.password.is_some())
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Thread-safe registry of credentials keyed by provider.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore(Arc<RwLock<HashMap<ProviderId, Credential>>>);
impl CredentialStore {
	/// Registers or replaces the credential for its provider.
	pub fn insert(&self, credential: Credential) -> Option<Credential> {
		self.0.write().insert(credential.provider.clone(), credential)
	}

	/// Returns a copy of the credential registered for `provider`.
	pub fn get(&self, provider: &str) -> Option<Credential> {
		self.0.read().get(provider).cloned()
	}

	/// Returns the credential for `provider` or a configuration error.
	pub fn require(&self, provider: &ProviderId) -> Result<Credential, ConfigError> {
		self.get(provider).ok_or_else(|| ConfigError::missing_credential(provider, "credential"))
	}

	/// Drops the credential registered for `provider`.
	pub fn remove(&self, provider: &str) -> Option<Credential> {
		self.0.write().remove(provider)
	}
}
impl FromIterator<Credential> for CredentialStore {
	fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
		let store = Self::default();

		for credential in iter {
			store.insert(credential);
		}

		store
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn provider(id: &str) -> ProviderId {
		ProviderId::new(id).expect("Provider fixture should be valid.")
	}

	#[test]
	fn fingerprint_separates_accounts_but_ignores_secrets() {
		let a = Credential::new(provider("amadeus"), "client-a").with_client_secret("one");
		let rotated = Credential::new(provider("amadeus"), "client-a").with_client_secret("two");
		let b = Credential::new(provider("amadeus"), "client-b").with_client_secret("one");

		assert_eq!(a.fingerprint(), rotated.fingerprint());
		assert_ne!(a.fingerprint(), b.fingerprint());
	}

	#[test]
	fn debug_output_hides_secrets() {
		let credential = Credential::new(provider("sabre"), "V1:user")
			.with_client_secret("client-secret")
			.with_user("agent", "hunter2");
		let rendered = format!("{credential:?}");

		assert!(!rendered.contains("client-secret"));
		assert!(!rendered.contains("hunter2"));
		assert!(rendered.contains("password_set: true"));
	}

	#[test]
	fn lookup_loader_reads_prefixed_variables() {
		let vars = HashMap::from([
			("AMADEUS_CLIENT_ID".to_owned(), "key".to_owned()),
			("AMADEUS_CLIENT_SECRET".to_owned(), "secret".to_owned()),
			("AMADEUS_USERNAME".to_owned(), String::new()),
		]);
		let credential =
			Credential::from_lookup(provider("amadeus"), "AMADEUS", |name| vars.get(name).cloned())
				.expect("Credential should load from the lookup table.");

		assert_eq!(credential.client_id, "key");
		assert_eq!(credential.client_secret.as_ref().map(Secret::expose), Some("secret"));
		assert_eq!(credential.username, None);

		let err = Credential::from_lookup(provider("amadeus"), "MISSING", |_| None)
			.expect_err("Missing client id should be rejected.");

		assert!(matches!(err, ConfigError::MissingCredential { field: "client_id", .. }));
	}

	#[test]
	fn store_requires_registered_credentials() {
		let store: CredentialStore =
			[Credential::new(provider("ticketmaster"), "apikey")].into_iter().collect();

		assert_eq!(
			store.require(&provider("ticketmaster")).expect("Credential should exist.").client_id,
			"apikey"
		);
		assert!(store.require(&provider("seatgeek")).is_err());
		assert!(store.remove("ticketmaster").is_some());
		assert!(store.get("ticketmaster").is_none());
	}

	#[test]
	fn credentials_deserialize_from_configuration() {
		let credential: Credential = serde_json::from_value(serde_json::json!({
			"provider": "booking",
			"client_id": "user",
			"client_secret": "pass",
			"headers": { "X-Affiliate-Id": "42" },
		}))
		.expect("Credential should deserialize.");

		assert_eq!(credential.headers.get("X-Affiliate-Id").map(String::as_str), Some("42"));
		assert!(credential.require_secret().is_ok());
	}
}
