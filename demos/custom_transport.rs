//! Plugs a non-reqwest [`HttpTransport`] and a provider-specific [`ErrorNormalizer`] into an
//! adapter.
//!
//! 1. Implement [`HttpTransport`] so the adapter can send through any HTTP stack; here an
//!    in-process responder that throttles the first request.
//! 2. Implement [`ErrorNormalizer`] for an envelope none of the built-in shapes know.
//! 3. Hand both to [`ProviderAdapter::with_transport`] and observe the retry.

// std
use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};
// crates.io
use color_eyre::Result;
use serde_json::Value;
use time::Duration;
use url::Url;
// self
use provider_broker::{
	auth::{Credential, ProviderId},
	error::TransportError,
	http::{HttpTransport, Method, RawResponse, SignedRequest, TransportFuture},
	normalize::{self, ErrorNormalizer, ErrorResult, ErrorShape},
	provider::{CallOptions, ProviderAdapter, ProviderDescriptor},
	retry::RetryPolicy,
	sign::{AuthStrategy, StaticHeaderSigner},
	token::TokenManager,
};

/// Answers locally: one 429 with a partner envelope, then the event list.
#[derive(Debug, Default)]
struct InProcessTransport {
	sends: AtomicU32,
}
impl HttpTransport for InProcessTransport {
	fn send(&self, request: SignedRequest, _: Duration) -> TransportFuture<'_> {
		let n = self.sends.fetch_add(1, Ordering::SeqCst);

		println!(
			"send #{} {} {} key={:?}",
			n + 1,
			request.method,
			request.url,
			request.header("apikey")
		);

		Box::pin(async move {
			let response = if n == 0 {
				RawResponse::new(429, r#"{"result":{"code":"QUOTA","text":"Slow down"}}"#)
					.with_header("Retry-After", "1")
			} else {
				RawResponse::new(200, r#"{"_embedded":{"events":[{"name":"Concert"}]}}"#)
			};

			Ok::<_, TransportError>(response)
		})
	}
}

/// Reads `{"result":{"code":..,"text":..}}` and defers to the built-in table otherwise.
struct PartnerEnvelope;
impl ErrorNormalizer for PartnerEnvelope {
	fn normalize(&self, status: u16, body: &[u8]) -> ErrorResult {
		let mut result = normalize::normalize(status, body, ErrorShape::Auto);
		let parsed = serde_json::from_slice::<Value>(body).ok();

		if let Some(envelope) = parsed.as_ref().and_then(|value| value.get("result")) {
			result.provider_code = envelope["code"].as_str().map(str::to_owned);

			if let Some(text) = envelope["text"].as_str() {
				result.message = text.to_owned();
			}
		}

		result
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let provider = ProviderId::new("ticketmaster")?;
	let descriptor = ProviderDescriptor::builder(provider.clone())
		.base_url(Url::parse("https://app.ticketmaster.com/discovery/v2")?)
		.auth(AuthStrategy::StaticHeader(StaticHeaderSigner::api_key("apikey")))
		.retry(RetryPolicy::new(3, Duration::milliseconds(200), Duration::seconds(2)))
		.error_normalizer(Arc::new(PartnerEnvelope))
		.build()?;
	let transport: Arc<dyn HttpTransport> = Arc::new(InProcessTransport::default());
	let tokens = Arc::new(TokenManager::in_memory(transport.clone()));
	let adapter = ProviderAdapter::with_transport(
		descriptor,
		Credential::new(provider, "demo-key"),
		transport,
		tokens,
	)?;
	let response = adapter
		.send("events.json", Method::Get, &[("city", "Berlin")], None, &CallOptions::default())
		.await?;

	println!("attempts: {}, body: {}", response.attempts, response.json()?);

	let rejected = PartnerEnvelope.normalize(403, br#"{"result":{"code":"DENIED","text":"No"}}"#);

	println!("{rejected}");

	Ok(())
}
