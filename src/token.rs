//! OAuth2 token acquisition, caching, and single-flight refresh.

pub mod exchange;
pub mod manager;
pub mod metrics;

pub use manager::*;
pub use metrics::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, Secret},
};

/// Grants supported at a provider token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// `client_credentials`.
	#[default]
	ClientCredentials,
	/// Resource-owner `password` grant; needs the credential's username and password.
	Password,
}
impl GrantType {
	/// Returns the `grant_type` form value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::Password => "password",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How the client authenticates itself at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// `client_id`/`client_secret` as form fields.
	#[default]
	ClientSecretPost,
	/// HTTP Basic with `client_id:client_secret`.
	ClientSecretBasic,
}

/// Token endpoint settings for an OAuth2 adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuth2Config {
	/// Absolute token endpoint URL.
	pub token_url: Url,
	/// Grant used to obtain tokens.
	pub grant: GrantType,
	/// Client authentication method.
	pub client_auth: ClientAuthMethod,
	/// Scope requested with every token call.
	pub scope: ScopeSet,
	/// Portion of the lifetime treated as expired.
	pub safety_margin: Duration,
	/// Lifetime assumed when the provider omits `expires_in`.
	pub default_expires_in: Duration,
	/// Additional form fields sent with every token call.
	pub extra_params: BTreeMap<String, String>,
}
impl OAuth2Config {
	/// Default safety margin.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);
	/// Default lifetime when `expires_in` is absent.
	pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(1800);

	/// Client-credentials configuration for `token_url`.
	pub fn client_credentials(token_url: Url) -> Self {
		Self {
			token_url,
			grant: GrantType::ClientCredentials,
			client_auth: ClientAuthMethod::default(),
			scope: ScopeSet::default(),
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			default_expires_in: Self::DEFAULT_EXPIRES_IN,
			extra_params: BTreeMap::new(),
		}
	}

	/// Password-grant configuration for `token_url`.
	pub fn password(token_url: Url) -> Self {
		Self { grant: GrantType::Password, ..Self::client_credentials(token_url) }
	}

	/// Overrides the client authentication method.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Sets the requested scope.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin.max(Duration::ZERO);

		self
	}

	/// Overrides the lifetime assumed when `expires_in` is absent.
	pub fn with_default_expires_in(mut self, lifetime: Duration) -> Self {
		self.default_expires_in = lifetime;

		self
	}

	/// Adds a form field sent with every token call.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(name.into(), value.into());

		self
	}
}

/// Parameters of one [`TokenManager::get_token`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Scope to request and to partition the cache by.
	pub scope: ScopeSet,
	/// Bypass a valid cached token.
	pub force: bool,
	/// Token the resource server just refused.
	pub rejected: Option<Secret>,
	/// Portion of the lifetime treated as expired.
	pub safety_margin: Duration,
}
impl TokenRequest {
	/// Creates a request for `scope` with the default safety margin.
	pub fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			force: false,
			rejected: None,
			safety_margin: OAuth2Config::DEFAULT_SAFETY_MARGIN,
		}
	}

	/// Creates a request using the scope and margin of `config`.
	pub fn for_config(config: &OAuth2Config) -> Self {
		Self::new(config.scope.clone()).with_safety_margin(config.safety_margin)
	}

	/// Forces the manager to bypass the cache.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Forces a refresh because `token` was refused.
	///
	/// The cache still satisfies the request when it already holds a different token, so
	/// concurrent callers reacting to the same refusal share one refresh.
	pub fn rejecting(mut self, token: &AccessToken) -> Self {
		self.force = true;
		self.rejected = Some(token.value.clone());

		self
	}

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin.max(Duration::ZERO);

		self
	}

	/// Returns `true` when `token` can be handed out for this request at `now`.
	pub fn accepts(&self, token: &AccessToken, now: OffsetDateTime) -> bool {
		if !token.is_valid_at(now, self.safety_margin) {
			return false;
		}
		if !self.force {
			return true;
		}

		self.rejected.as_ref().is_some_and(|rejected| rejected != &token.value)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn forced_requests_accept_only_replacement_tokens() {
		let now = OffsetDateTime::now_utc();
		let stale = AccessToken::new("old", now, Duration::minutes(30));
		let fresh = AccessToken::new("new", now, Duration::minutes(30));
		let plain = TokenRequest::new(ScopeSet::default());

		assert!(plain.accepts(&stale, now));
		assert!(!plain.clone().force_refresh().accepts(&fresh, now));

		let rejecting = plain.rejecting(&stale);

		assert!(!rejecting.accepts(&stale, now));
		assert!(rejecting.accepts(&fresh, now));
	}

	#[test]
	fn negative_margins_clamp_to_zero() {
		let request =
			TokenRequest::new(ScopeSet::default()).with_safety_margin(Duration::seconds(-5));
		let config = OAuth2Config::client_credentials(
			Url::parse("https://auth.example.com/token").expect("URL fixture should parse."),
		)
		.with_safety_margin(Duration::seconds(-1));

		assert_eq!(request.safety_margin, Duration::ZERO);
		assert_eq!(config.safety_margin, Duration::ZERO);
		assert_eq!(TokenRequest::for_config(&config).safety_margin, Duration::ZERO);
	}
}
