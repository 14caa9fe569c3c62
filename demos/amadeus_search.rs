//! Calls an Amadeus-style API through a [`ProviderAdapter`] with OAuth2 client credentials,
//! using a local mock server so the demo runs offline.
//!
//! The second call reuses the cached bearer token; only one token request reaches the server.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use provider_broker::{
	auth::{Credential, ProviderId},
	http::{HttpTransport, Method, ReqwestTransport},
	provider::{ProviderAdapter, ProviderDescriptor},
	reqwest::Client,
	sign::AuthStrategy,
	token::{OAuth2Config, TokenManager},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/security/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"demo-access","token_type":"Bearer","expires_in":1799}"#);
		})
		.await;
	let search_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/reference-data/locations/hotels/by-city")
				.header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"data":[{"hotelId":"MCLONGHM","name":"JW Marriott Grosvenor House"}]}"#);
		})
		.await;
	let provider = ProviderId::new("amadeus")?;
	let descriptor = ProviderDescriptor::builder(provider.clone())
		.base_url(Url::parse(&server.url("/v1"))?)
		.auth(AuthStrategy::OAuth2(OAuth2Config::client_credentials(Url::parse(
			&server.url("/v1/security/oauth2/token"),
		)?)))
		.allow_insecure(true)
		.build()?;
	let credential = Credential::new(provider, "demo-client").with_client_secret("demo-secret");
	let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	));
	let tokens = Arc::new(TokenManager::in_memory(transport.clone()));
	let adapter = ProviderAdapter::with_transport(descriptor, credential, transport, tokens)?;

	for city in ["LON", "PAR"] {
		let query = [("cityCode", city)];
		let hotels = adapter
			.call("reference-data/locations/hotels/by-city", Method::Get, &query, None)
			.await?;

		println!("{city}: {}", hotels["data"]);
	}

	token_mock.assert_calls_async(1).await;
	search_mock.assert_calls_async(2).await;

	println!("token refreshes: {}", adapter.tokens().refresh_metrics.attempts());

	Ok(())
}
