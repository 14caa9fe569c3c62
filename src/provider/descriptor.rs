//! Provider descriptor data structures.

/// Builder API for assembling provider descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	http::Headers,
	normalize::ErrorNormalizer,
	retry::RetryPolicy,
	sign::AuthStrategy,
};

/// Immutable description of one external API.
#[derive(Clone)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Base URL endpoints are resolved against; always ends with `/`.
	pub base_url: Url,
	/// How calls are authenticated.
	pub auth: AuthStrategy,
	/// Default retry policy for calls.
	pub retry: RetryPolicy,
	/// Parser for the provider's error envelope.
	pub error_normalizer: Arc<dyn ErrorNormalizer>,
	/// Per-attempt timeout.
	pub timeout: Duration,
	/// Headers sent with every call.
	pub default_headers: Headers,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}
}
impl Debug for ProviderDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderDescriptor")
			.field("id", &self.id)
			.field("base_url", &self.base_url.as_str())
			.field("auth", &self.auth)
			.field("retry", &self.retry)
			.field("timeout", &self.timeout)
			.field("default_headers", &self.default_headers)
			.finish_non_exhaustive()
	}
}
