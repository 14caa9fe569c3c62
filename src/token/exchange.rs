//! Single token endpoint round trip: form encoding, client authentication, response parsing.

// crates.io
use serde_json::Deserializer;
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential},
	error::{ConfigError, TransportError},
	http::{Headers, HttpTransport, Method, RawResponse, SignedRequest},
	normalize::{self, ErrorKind, ErrorResult, ErrorShape},
	sign,
	token::{ClientAuthMethod, GrantType, OAuth2Config},
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<ExpiresIn>,
	#[serde(default)]
	scope: Option<String>,
}

// Some gateways quote numeric fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}
impl ExpiresIn {
	fn seconds(&self) -> Option<i64> {
		match self {
			Self::Seconds(secs) => Some(*secs),
			Self::Text(raw) => raw.trim().parse().ok(),
		}
	}
}

/// Builds the token request for `credential` without sending it.
pub fn build_request(config: &OAuth2Config, credential: &Credential) -> Result<SignedRequest> {
	let secret = credential.require_secret()?;
	let mut form = Serializer::new(String::new());
	let mut headers = Headers::from([
		("Content-Type".into(), "application/x-www-form-urlencoded".into()),
		("Accept".into(), "application/json".into()),
	]);

	form.append_pair("grant_type", config.grant.as_str());

	if config.grant == GrantType::Password {
		let username = credential
			.username
			.as_deref()
			.ok_or_else(|| ConfigError::missing_credential(&credential.provider, "username"))?;
		let password = credential
			.password
			.as_ref()
			.ok_or_else(|| ConfigError::missing_credential(&credential.provider, "password"))?;

		form.append_pair("username", username);
		form.append_pair("password", password.expose());
	}
	if let Some(scope) = config.scope.join(' ') {
		form.append_pair("scope", &scope);
	}

	for (name, value) in &config.extra_params {
		form.append_pair(name, value);
	}

	match config.client_auth {
		ClientAuthMethod::ClientSecretPost => {
			form.append_pair("client_id", &credential.client_id);
			form.append_pair("client_secret", secret.expose());
		},
		ClientAuthMethod::ClientSecretBasic => {
			headers.insert(
				"Authorization".into(),
				sign::basic_authorization(&credential.client_id, secret.expose()),
			);
		},
	}

	Ok(SignedRequest {
		method: Method::Post,
		url: config.token_url.clone(),
		headers,
		body: Some(form.finish().into_bytes()),
	})
}

/// Performs one token call; never retries.
pub async fn request_token(
	transport: &dyn HttpTransport,
	config: &OAuth2Config,
	credential: &Credential,
	timeout: Duration,
) -> Result<AccessToken> {
	let request = build_request(config, credential)?;
	let response = transport.send(request, timeout).await.map_err(TransportError::into_error)?;

	if !response.is_success() {
		return Err(token_endpoint_error(&response).into());
	}

	parse_token_response(config, &response, OffsetDateTime::now_utc()).map_err(Error::from)
}

/// Parses a 2xx token response received at `issued_at`.
pub fn parse_token_response(
	config: &OAuth2Config,
	response: &RawResponse,
	issued_at: OffsetDateTime,
) -> Result<AccessToken, ErrorResult> {
	let mut de = Deserializer::from_slice(&response.body);
	let parsed: TokenResponse = serde_path_to_error::deserialize(&mut de).map_err(|e| {
		ErrorResult::terminal(
			ErrorKind::Unknown,
			format!("Token endpoint returned malformed JSON at `{}`: {}.", e.path(), e.inner()),
		)
		.with_status(response.status)
	})?;

	if parsed.access_token.is_empty() {
		return Err(ErrorResult::terminal(
			ErrorKind::Unknown,
			"Token endpoint returned an empty access_token.",
		)
		.with_status(response.status));
	}

	let expires_in = match &parsed.expires_in {
		Some(raw) => Duration::seconds(raw.seconds().ok_or_else(|| {
			ErrorResult::terminal(
				ErrorKind::Unknown,
				"Token endpoint returned a non-numeric expires_in.",
			)
			.with_status(response.status)
		})?),
		None => config.default_expires_in,
	};

	if !expires_in.is_positive() {
		return Err(ErrorResult::terminal(
			ErrorKind::Unknown,
			format!("Token endpoint returned expires_in {expires_in}; it must be positive."),
		)
		.with_status(response.status));
	}

	let mut token = AccessToken::try_new(parsed.access_token, issued_at, expires_in)
		.ok_or_else(|| {
			ErrorResult::terminal(
				ErrorKind::Unknown,
				format!("Token endpoint returned expires_in {expires_in}, which is out of range."),
			)
			.with_status(response.status)
		})?;

	if let Some(token_type) = parsed.token_type.filter(|t| !t.is_empty()) {
		// RFC 6749 token types are case-insensitive; resource servers expect `Bearer`.
		token.token_type = if token_type.eq_ignore_ascii_case(AccessToken::BEARER) {
			AccessToken::BEARER.into()
		} else {
			token_type
		};
	}
	if let Some(scope) = parsed.scope {
		token = token.with_scope(scope);
	}

	Ok(token)
}

/// Maps a non-2xx token response; rejected client credentials surface as `Unauthorized`.
fn token_endpoint_error(response: &RawResponse) -> ErrorResult {
	let mut result = normalize::normalize(response.status, &response.body, ErrorShape::Auto)
		.with_retry_after(response.retry_after());

	if matches!(response.status, 400 | 401 | 403) {
		result.kind = ErrorKind::Unauthorized;
		result.retryable = false;
	}

	result
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{ProviderId, ScopeSet};

	fn config() -> OAuth2Config {
		OAuth2Config::client_credentials(
			Url::parse("https://test.api.amadeus.com/v1/security/oauth2/token")
				.expect("Token URL fixture should parse."),
		)
	}

	fn credential() -> Credential {
		let provider = ProviderId::new("amadeus").expect("Provider fixture should be valid.");

		Credential::new(provider, "X").with_client_secret("Y")
	}

	fn body(request: &SignedRequest) -> String {
		String::from_utf8(request.body.clone().expect("Token request should carry a body."))
			.expect("Form body should be UTF-8.")
	}

	#[test]
	fn client_secret_post_puts_credentials_in_form() {
		let scope = ScopeSet::new(["read", "book"]).expect("Scope fixture should be valid.");
		let request = build_request(&config().with_scope(scope), &credential())
			.expect("Request should build.");

		assert_eq!(request.method, Method::Post);
		assert_eq!(
			body(&request),
			"grant_type=client_credentials&scope=book+read&client_id=X&client_secret=Y"
		);
		assert_eq!(request.header("authorization"), None);
		assert_eq!(request.header("content-type"), Some("application/x-www-form-urlencoded"));
	}

	#[test]
	fn client_secret_basic_uses_authorization_header() {
		let request = build_request(
			&config().with_client_auth(ClientAuthMethod::ClientSecretBasic),
			&credential(),
		)
		.expect("Request should build.");

		assert_eq!(body(&request), "grant_type=client_credentials");
		assert_eq!(request.header("authorization"), Some("Basic WDpZ"));
	}

	#[test]
	fn password_grant_requires_user_credentials() {
		let config = OAuth2Config::password(config().token_url)
			.with_client_auth(ClientAuthMethod::ClientSecretBasic)
			.with_param("agency", "A1");
		let err = build_request(&config, &credential())
			.expect_err("Password grant without a user should be rejected.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::MissingCredential { field: "username", .. })
		));

		let request = build_request(&config, &credential().with_user("agent", "p@ss"))
			.expect("Request should build.");

		assert_eq!(body(&request), "grant_type=password&username=agent&password=p%40ss&agency=A1");
	}

	#[test]
	fn response_defaults_and_string_lifetimes() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let minimal = RawResponse::new(200, r#"{"access_token":"abc"}"#);
		let token = parse_token_response(&config(), &minimal, issued)
			.expect("Minimal response should parse.");

		assert_eq!(token.authorization(), "Bearer abc");
		assert_eq!(token.expires_at, issued + Duration::seconds(1800));

		let quoted = RawResponse::new(
			200,
			r#"{"access_token":"abc","token_type":"bearer","expires_in":"1799","scope":"read"}"#,
		);
		let token = parse_token_response(&config(), &quoted, issued)
			.expect("Quoted lifetime should parse.");

		assert_eq!(token.token_type, "Bearer");
		assert_eq!(token.expires_in, Duration::seconds(1799));
		assert_eq!(token.scope.as_deref(), Some("read"));
	}

	#[test]
	fn lifetimes_must_be_positive_and_representable() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);

		for body in [
			r#"{"access_token":"abc","expires_in":0}"#,
			r#"{"access_token":"abc","expires_in":-5}"#,
			r#"{"access_token":"abc","expires_in":"-1"}"#,
		] {
			let err = parse_token_response(&config(), &RawResponse::new(200, body), issued)
				.expect_err("Non-positive lifetimes should be rejected.");

			assert_eq!(err.kind, ErrorKind::Unknown);
			assert!(!err.retryable);
			assert!(err.message.contains("must be positive"), "{}", err.message);
		}

		let huge = RawResponse::new(200, r#"{"access_token":"abc","expires_in":99999999999999}"#);
		let err = parse_token_response(&config(), &huge, issued)
			.expect_err("Lifetimes past the representable range should be rejected.");

		assert!(!err.retryable);
		assert!(err.message.contains("out of range"), "{}", err.message);
	}

	#[test]
	fn malformed_responses_report_the_failing_path() {
		let response = RawResponse::new(200, r#"{"access_token":42}"#);
		let err = parse_token_response(&config(), &response, OffsetDateTime::now_utc())
			.expect_err("Numeric access_token should be rejected.");

		assert_eq!(err.kind, ErrorKind::Unknown);
		assert!(!err.retryable);
		assert!(err.message.contains("access_token"), "{}", err.message);
	}

	#[test]
	fn token_endpoint_rejections_become_unauthorized() {
		let invalid_client = RawResponse::new(
			401,
			r#"{"error":"invalid_client","error_description":"Client credentials are invalid"}"#,
		);
		let result = token_endpoint_error(&invalid_client);

		assert_eq!(result.kind, ErrorKind::Unauthorized);
		assert!(!result.retryable);
		assert_eq!(result.provider_code.as_deref(), Some("invalid_client"));

		let throttled =
			token_endpoint_error(&RawResponse::new(429, "").with_header("Retry-After", "3"));

		assert_eq!(throttled.kind, ErrorKind::RateLimited);
		assert!(throttled.retryable);
		assert_eq!(throttled.retry_after, Some(Duration::seconds(3)));
	}
}
