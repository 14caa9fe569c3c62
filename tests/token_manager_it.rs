mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinSet;
// self
use common::*;
use provider_broker::{
	auth::{AccessToken, Credential, ScopeSet, TokenState},
	error::Error,
	http::HttpTransport,
	normalize::ErrorKind,
	store::{CacheKey, TokenStore},
	token::{ClientAuthMethod, OAuth2Config, TokenManager, TokenRequest},
};

fn config() -> OAuth2Config {
	OAuth2Config::client_credentials(url(&format!("https://auth.test{TOKEN_PATH}")))
}

fn credential(client_id: &str) -> Credential {
	Credential::new(provider("amadeus"), client_id).with_client_secret("Y")
}

fn manager(transport: &Arc<ScriptedTransport>) -> Arc<TokenManager> {
	let transport: Arc<dyn HttpTransport> = transport.clone();

	Arc::new(TokenManager::in_memory(transport))
}

async fn state(
	tokens: &TokenManager,
	credential: &Credential,
	request: &TokenRequest,
) -> TokenState {
	tokens.state(credential, request).await.expect("State lookup should succeed.")
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_token_call() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[Reply::After(
			std::time::Duration::from_millis(50),
			json(200, r#"{"access_token":"abc","expires_in":1800}"#),
		)],
	));
	let tokens = manager(&transport);
	let mut callers = JoinSet::new();

	for _ in 0..16 {
		let tokens = tokens.clone();

		callers.spawn(async move {
			let config = config();

			tokens.get_token(&config, &credential("X"), TokenRequest::for_config(&config)).await
		});
	}

	while let Some(joined) = callers.join_next().await {
		let token = joined
			.expect("Caller task should not panic.")
			.expect("Every concurrent caller should receive a token.");

		assert_eq!(token.value.expose(), "abc");
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
	assert_eq!(tokens.refresh_metrics.attempts(), 1);
	assert_eq!(tokens.refresh_metrics.successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_renew_an_expiring_token_once() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[Reply::After(
			std::time::Duration::from_millis(50),
			json(200, r#"{"access_token":"renewed","expires_in":1800}"#),
		)],
	));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	// Thirty seconds left is inside the sixty second margin.
	let expiring = AccessToken::new(
		"expiring",
		OffsetDateTime::now_utc() - Duration::seconds(1770),
		Duration::minutes(30),
	);

	tokens
		.store()
		.save(CacheKey::new(&credential, &config.scope), expiring)
		.await
		.expect("Seeding the cache should succeed.");

	let mut callers = JoinSet::new();

	for _ in 0..16 {
		let tokens = tokens.clone();
		let config = config.clone();
		let credential = credential.clone();

		callers.spawn(async move {
			tokens.get_token(&config, &credential, TokenRequest::for_config(&config)).await
		});
	}

	while let Some(joined) = callers.join_next().await {
		let token = joined
			.expect("Caller task should not panic.")
			.expect("Every concurrent caller should receive the renewed token.");

		assert_eq!(token.value.expose(), "renewed");
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
	assert_eq!(
		state(&tokens, &credential, &TokenRequest::for_config(&config)).await,
		TokenState::Valid
	);
}

#[tokio::test]
async fn unusable_lifetimes_are_rejected_and_not_cached() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[
			Reply::Respond(json(200, r#"{"access_token":"zero","expires_in":0}"#)),
			Reply::Respond(json(200, r#"{"access_token":"past","expires_in":-5}"#)),
			Reply::Respond(json(200, r#"{"access_token":"far","expires_in":99999999999999}"#)),
		],
	));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let request = TokenRequest::for_config(&config);

	for _ in 0..3 {
		let err = tokens
			.get_token(&config, &credential, request.clone())
			.await
			.expect_err("Unusable lifetimes should be rejected.");
		let api = err.as_api().expect("Lifetime failures should surface as API errors.");

		assert_eq!(api.kind, ErrorKind::Unknown);
		assert!(!api.retryable);
		assert_eq!(state(&tokens, &credential, &request).await, TokenState::Unauthenticated);
	}

	assert_eq!(transport.calls(TOKEN_PATH), 3);
	assert!(
		tokens
			.store()
			.fetch(&CacheKey::new(&credential, &config.scope))
			.await
			.expect("Cache lookup should succeed.")
			.is_none()
	);
}

#[tokio::test]
async fn cached_tokens_are_reused_until_the_safety_margin() {
	let transport =
		Arc::new(ScriptedTransport::default().on(TOKEN_PATH, [token_reply("fresh", 1800)]));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let key = CacheKey::new(&credential, &config.scope);
	let now = OffsetDateTime::now_utc();

	tokens
		.store()
		.save(key.clone(), AccessToken::new("warm", now, Duration::seconds(1800)))
		.await
		.expect("Seeding the cache should succeed.");

	let token = tokens
		.get_token(&config, &credential, TokenRequest::for_config(&config))
		.await
		.expect("Warm token should be served from the cache.");

	assert_eq!(token.value.expose(), "warm");
	assert_eq!(transport.calls(TOKEN_PATH), 0);

	// Thirty seconds left is inside the sixty second margin.
	tokens
		.store()
		.save(key, AccessToken::new("stale", now - Duration::seconds(1770), Duration::minutes(30)))
		.await
		.expect("Seeding the cache should succeed.");

	assert_eq!(
		tokens
			.state(&credential, &TokenRequest::for_config(&config))
			.await
			.expect("State lookup should succeed."),
		TokenState::Expired
	);

	let token = tokens
		.get_token(&config, &credential, TokenRequest::for_config(&config))
		.await
		.expect("Stale token should be refreshed.");

	assert_eq!(token.value.expose(), "fresh");
	assert_eq!(transport.calls(TOKEN_PATH), 1);

	let forced = tokens
		.get_token(&config, &credential, TokenRequest::for_config(&config).force_refresh())
		.await
		.expect("Forced refresh should succeed.");

	assert_eq!(forced.value.expose(), "fresh");
	assert_eq!(transport.calls(TOKEN_PATH), 2);
}

#[tokio::test(start_paused = true)]
async fn state_moves_through_the_lifecycle() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[
			Reply::After(std::time::Duration::from_secs(1), json(500, r#"{"message":"boom"}"#)),
			Reply::After(
				std::time::Duration::from_secs(1),
				json(200, r#"{"access_token":"abc","expires_in":1800}"#),
			),
		],
	));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let request = TokenRequest::for_config(&config);

	assert_eq!(state(&tokens, &credential, &request).await, TokenState::Unauthenticated);

	let pending = {
		let (tokens, config, credential, request) =
			(tokens.clone(), config.clone(), credential.clone(), request.clone());

		tokio::spawn(async move { tokens.get_token(&config, &credential, request).await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(10)).await;

	assert_eq!(state(&tokens, &credential, &request).await, TokenState::Authenticating);

	let err = pending
		.await
		.expect("Refresh task should not panic.")
		.expect_err("Server error from the token endpoint should surface.");

	assert_eq!(err.kind(), Some(ErrorKind::ServerError));
	assert_eq!(state(&tokens, &credential, &request).await, TokenState::Unauthenticated);

	// The manager never retries by itself; the next call starts over.
	let token = tokens
		.get_token(&config, &credential, request.clone())
		.await
		.expect("Second refresh should succeed.");

	assert_eq!(token.value.expose(), "abc");
	assert_eq!(state(&tokens, &credential, &request).await, TokenState::Valid);
	assert_eq!(transport.calls(TOKEN_PATH), 2);
	assert_eq!(tokens.refresh_metrics.failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn waiters_share_a_failed_refresh() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[Reply::After(
			std::time::Duration::from_millis(20),
			json(401, r#"{"error":"invalid_client"}"#),
		)],
	));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let request = TokenRequest::for_config(&config);
	let (first, second) = tokio::join!(
		tokens.get_token(&config, &credential, request.clone()),
		tokens.get_token(&config, &credential, request),
	);

	for result in [first, second] {
		let err = result.expect_err("Rejected client credentials should fail every waiter.");
		let api = err.as_api().expect("Token endpoint rejection should be an API error.");

		assert_eq!(api.kind, ErrorKind::Unauthorized);
		assert!(!api.retryable);
		assert_eq!(api.provider_code.as_deref(), Some("invalid_client"));
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_token_triggers_one_shared_refresh() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[Reply::After(
			std::time::Duration::from_millis(20),
			json(200, r#"{"access_token":"new","expires_in":1800}"#),
		)],
	));
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let old = AccessToken::new("old", OffsetDateTime::now_utc(), Duration::seconds(1800));

	tokens
		.store()
		.save(CacheKey::new(&credential, &config.scope), old.clone())
		.await
		.expect("Seeding the cache should succeed.");

	let request = TokenRequest::for_config(&config).rejecting(&old);
	let (a, b, c) = tokio::join!(
		tokens.get_token(&config, &credential, request.clone()),
		tokens.get_token(&config, &credential, request.clone()),
		tokens.get_token(&config, &credential, request),
	);

	for result in [a, b, c] {
		assert_eq!(result.expect("Refresh should succeed.").value.expose(), "new");
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
}

#[tokio::test]
async fn cache_entries_are_isolated_per_account_and_scope() {
	let transport = Arc::new(ScriptedTransport::default().on(
		TOKEN_PATH,
		[token_reply("for-a", 1800), token_reply("for-b", 1800), token_reply("scoped", 1800)],
	));
	let tokens = manager(&transport);
	let config = config();
	let a = tokens
		.get_token(&config, &credential("A"), TokenRequest::for_config(&config))
		.await
		.expect("Account A should receive a token.");
	let b = tokens
		.get_token(&config, &credential("B"), TokenRequest::for_config(&config))
		.await
		.expect("Account B should receive a token.");

	assert_eq!(a.value.expose(), "for-a");
	assert_eq!(b.value.expose(), "for-b");

	let scoped = config
		.clone()
		.with_scope(ScopeSet::new(["hotels"]).expect("Scope fixture should be valid."));
	let token = tokens
		.get_token(&scoped, &credential("A"), TokenRequest::for_config(&scoped))
		.await
		.expect("Scoped request should receive its own token.");

	assert_eq!(token.value.expose(), "scoped");

	let again = tokens
		.get_token(&config, &credential("A"), TokenRequest::for_config(&config))
		.await
		.expect("Account A should hit the cache.");

	assert_eq!(again.value.expose(), "for-a");
	assert_eq!(transport.calls(TOKEN_PATH), 3);
	assert_eq!(
		tokens
			.invalidate(&credential("A"), &TokenRequest::for_config(&config))
			.await
			.expect("Invalidation should succeed.")
			.map(|token| token.value.expose().to_owned()),
		Some("for-a".to_owned())
	);
}

#[tokio::test(start_paused = true)]
async fn cancelled_refresh_releases_the_slot() {
	let transport = Arc::new(
		ScriptedTransport::default().on(TOKEN_PATH, [Reply::Hang, token_reply("abc", 1800)]),
	);
	let tokens = manager(&transport);
	let config = config();
	let credential = credential("X");
	let request = TokenRequest::for_config(&config);
	let cancelled = tokio::time::timeout(
		std::time::Duration::from_secs(1),
		tokens.get_token(&config, &credential, request.clone()),
	)
	.await;

	assert!(cancelled.is_err(), "Hanging refresh should be cut off by the caller.");
	assert_eq!(
		tokens.state(&credential, &request).await.expect("State lookup should succeed."),
		TokenState::Unauthenticated
	);

	let token = tokens
		.get_token(&config, &credential, request)
		.await
		.expect("Next caller should acquire the slot and refresh.");

	assert_eq!(token.value.expose(), "abc");
	assert_eq!(transport.calls(TOKEN_PATH), 2);
}

#[tokio::test]
async fn missing_secret_is_a_configuration_error() {
	let transport =
		Arc::new(ScriptedTransport::default().on(TOKEN_PATH, [token_reply("abc", 60)]));
	let tokens = manager(&transport);
	let config = config();
	let err = tokens
		.get_token(
			&config,
			&Credential::new(provider("amadeus"), "X"),
			TokenRequest::for_config(&config),
		)
		.await
		.expect_err("Credential without a secret should be rejected.");

	assert!(matches!(err, Error::Config(_)));
	assert_eq!(transport.calls(TOKEN_PATH), 0);
}

#[tokio::test]
async fn token_calls_use_the_configured_client_auth() {
	let server = MockServer::start_async().await;
	let post = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/post/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body("grant_type=client_credentials&client_id=X&client_secret=Y");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"posted","token_type":"bearer","expires_in":1799}"#);
		})
		.await;
	let basic = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/basic/token")
				.header("authorization", "Basic WDpZ")
				.body("grant_type=password&username=agent&password=secret");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"basic","expires_in":"1800"}"#);
		})
		.await;
	let transport: Arc<dyn HttpTransport> = Arc::new(test_reqwest_transport());
	let tokens = TokenManager::in_memory(transport);
	let post_config = OAuth2Config::client_credentials(url(&server.url("/post/token")));
	let token = tokens
		.get_token(&post_config, &credential("X"), TokenRequest::for_config(&post_config))
		.await
		.expect("client_secret_post exchange should succeed.");

	assert_eq!(token.authorization(), "Bearer posted");
	assert_eq!(token.expires_in, Duration::seconds(1799));

	let basic_config = OAuth2Config::password(url(&server.url("/basic/token")))
		.with_client_auth(ClientAuthMethod::ClientSecretBasic);
	let token = tokens
		.get_token(
			&basic_config,
			&credential("X").with_user("agent", "secret"),
			TokenRequest::for_config(&basic_config),
		)
		.await
		.expect("client_secret_basic password exchange should succeed.");

	assert_eq!(token.value.expose(), "basic");

	post.assert_calls_async(1).await;
	basic.assert_calls_async(1).await;
}
