//! Checks the Hotelbeds test environment with HMAC-signed requests.
//!
//! Reads `HOTELBEDS_CLIENT_ID` (API key) and `HOTELBEDS_CLIENT_SECRET` from the environment.

// crates.io
use color_eyre::Result;
use url::Url;
// self
use provider_broker::{
	auth::{Credential, ProviderId},
	http::Method,
	normalize::ErrorShape,
	provider::{CallOptions, ProviderAdapter, ProviderDescriptor},
	sign::{AuthStrategy, HmacSigner},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let provider = ProviderId::new("hotelbeds")?;
	let credential = Credential::from_env(provider.clone(), "HOTELBEDS")?;
	let descriptor = ProviderDescriptor::builder(provider)
		.base_url(Url::parse("https://api.test.hotelbeds.com/hotel-api/1.0")?)
		.auth(AuthStrategy::Hmac(HmacSigner::default()))
		.error_shape(ErrorShape::Auto)
		.build()?;
	let adapter = ProviderAdapter::new(descriptor, credential)?;
	let options = CallOptions::default().within(std::time::Duration::from_secs(20));

	match adapter.call_with("status", Method::Get, &[], None, &options).await {
		Ok(status) => println!("status: {status}"),
		Err(e) => match e.as_api() {
			Some(result) => println!(
				"{} (http {:?}, code {:?}, retryable {})",
				result.kind, result.http_status, result.provider_code, result.retryable
			),
			None => return Err(e.into()),
		},
	}

	Ok(())
}
