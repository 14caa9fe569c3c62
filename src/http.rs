//! Transport primitives shared by the token manager and the dispatch client.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. It receives a fully
//! signed [`SignedRequest`] plus a per-attempt timeout and hands back a [`RawResponse`]
//! for any HTTP status; only failures to obtain a response at all surface as
//! [`TransportError`]. Status classification happens later in
//! [`normalize`](crate::normalize).

// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Header map used across signers and transports.
///
/// Names keep the casing the signer chose; lookups through [`header`] are
/// case-insensitive.
pub type Headers = BTreeMap<String, String>;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing signed requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared
/// across adapters and the token manager behind an `Arc`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request`, aborting once `timeout` elapses.
	fn send(&self, request: SignedRequest, timeout: Duration) -> TransportFuture<'_>;
}

/// HTTP methods used by provider APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns the wire representation.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One physical request with its authentication material already attached.
///
/// Built fresh for every attempt; HMAC signatures are timestamp-bound and must not be
/// replayed.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedRequest {
	/// HTTP method.
	pub method: Method,
	/// Fully resolved URL including the query string.
	pub url: Url,
	/// Headers, including auth headers.
	pub headers: Headers,
	/// Encoded request body.
	pub body: Option<Vec<u8>>,
}
impl SignedRequest {
	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		header(&self.headers, name)
	}
}
impl Debug for SignedRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignedRequest")
			.field("method", &self.method)
			.field("origin", &self.url.origin().ascii_serialization())
			.field("path", &self.url.path())
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Response returned by a transport for any HTTP status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lower-cased names.
	pub headers: Headers,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: Headers::new(), body: body.into() }
	}

	/// Adds a header; the name is lower-cased.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		header(&self.headers, name)
	}

	/// Parses the `Retry-After` header (delta seconds or an RFC 2822 date).
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(self.header("retry-after")?, OffsetDateTime::now_utc())
	}
}

/// Case-insensitive lookup over a [`Headers`] map.
pub fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
	headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Thin wrapper around [`ReqwestClient`] implementing [`HttpTransport`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn execute(
		client: ReqwestClient,
		request: SignedRequest,
		timeout: Duration,
	) -> Result<RawResponse, TransportError> {
		let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
			.map_err(|e| TransportError::Build { source: Box::new(e) })?;
		let mut builder = client.request(method, request.url).timeout(timeout.unsigned_abs());

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let mut headers = Headers::new();

		for (name, value) in response.headers() {
			if let Ok(value) = value.to_str() {
				headers.insert(name.as_str().to_owned(), value.to_owned());
			}
		}

		let body = response.bytes().await?.to_vec();

		Ok(RawResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: SignedRequest, timeout: Duration) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(Self::execute(client, request, timeout))
	}
}

fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
