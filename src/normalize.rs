//! Canonical error taxonomy and provider error-envelope parsing.
//!
//! The HTTP status is the primary key for [`ErrorKind`]; provider bodies are mined
//! opportunistically for a `provider_code` and a human-readable message. A body that
//! cannot be parsed never prevents a valid [`ErrorResult`].

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// Canonical failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// 401: credentials or token rejected.
	Unauthorized,
	/// 403: authenticated but not allowed.
	Forbidden,
	/// 404.
	NotFound,
	/// 429: provider throttled the caller.
	RateLimited,
	/// 400/422: request rejected as malformed.
	Validation,
	/// 5xx.
	ServerError,
	/// No HTTP response (DNS, TCP, TLS, timeout).
	NetworkError,
	/// Anything else, including exhausted retry budgets for unclassified failures.
	Unknown,
}
impl ErrorKind {
	/// Maps an HTTP status onto a kind.
	pub const fn from_status(status: u16) -> Self {
		match status {
			401 => ErrorKind::Unauthorized,
			403 => ErrorKind::Forbidden,
			404 => ErrorKind::NotFound,
			400 | 422 => ErrorKind::Validation,
			429 => ErrorKind::RateLimited,
			500..=599 => ErrorKind::ServerError,
			_ => ErrorKind::Unknown,
		}
	}

	/// Whether failures of this kind are worth another attempt.
	///
	/// `Unauthorized` is retryable only through a token refresh; the dispatch client never
	/// spends the generic retry budget on it.
	pub const fn is_retryable(self) -> bool {
		matches!(
			self,
			ErrorKind::Unauthorized
				| ErrorKind::RateLimited
				| ErrorKind::ServerError
				| ErrorKind::NetworkError
		)
	}

	/// Returns a stable label suitable for logs and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Unauthorized => "unauthorized",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::NotFound => "not_found",
			ErrorKind::RateLimited => "rate_limited",
			ErrorKind::Validation => "validation",
			ErrorKind::ServerError => "server_error",
			ErrorKind::NetworkError => "network_error",
			ErrorKind::Unknown => "unknown",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Normalized failure returned to callers for every expected error path.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Provider call failed with {kind}: {message}")]
pub struct ErrorResult {
	/// Canonical category.
	pub kind: ErrorKind,
	/// HTTP status, absent for network failures.
	pub http_status: Option<u16>,
	/// Provider-specific error code mined from the body.
	pub provider_code: Option<String>,
	/// Human-readable message.
	pub message: String,
	/// Whether another attempt may succeed.
	pub retryable: bool,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
}
impl ErrorResult {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a result keyed on the HTTP status alone.
	pub fn from_status(status: u16) -> Self {
		let kind = ErrorKind::from_status(status);

		Self {
			kind,
			http_status: Some(status),
			provider_code: None,
			message: format!("HTTP {status}"),
			retryable: kind.is_retryable(),
			retry_after: None,
		}
	}

	/// Creates a retryable network failure.
	pub fn network(message: impl Into<String>) -> Self {
		Self {
			kind: ErrorKind::NetworkError,
			http_status: None,
			provider_code: None,
			message: message.into(),
			retryable: true,
			retry_after: None,
		}
	}

	/// Creates a retryable network failure for an elapsed per-attempt timeout.
	pub fn timeout() -> Self {
		Self::network("Request timed out while calling the provider.")
	}

	/// Creates a non-retryable failure of the given kind.
	pub fn terminal(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			http_status: None,
			provider_code: None,
			message: message.into(),
			retryable: false,
			retry_after: None,
		}
	}

	/// Overrides the HTTP status.
	pub fn with_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Attaches a Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}

	/// Marks the result as final after the retry budget ran out.
	pub fn exhausted(mut self) -> Self {
		self.retryable = false;

		self
	}
}

/// Pluggable parser turning a non-2xx response into an [`ErrorResult`].
pub trait ErrorNormalizer
where
	Self: Send + Sync,
{
	/// Normalizes `status` and `body` into the canonical taxonomy.
	fn normalize(&self, status: u16, body: &[u8]) -> ErrorResult;
}

/// Known provider error envelopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorShape {
	/// Try every known envelope in turn.
	#[default]
	Auto,
	/// JSON:API style `{"errors":[{"status":401,"code":38191,"title":..,"detail":..}]}`.
	ErrorsArray,
	/// `{"status":"error","error":"no_auth_header","debug":..}`.
	StatusError,
	/// OAuth style `{"error":"invalid_request","error_description":..}`; `description` and
	/// `message` are accepted as the description field.
	OAuth,
	/// API gateway faults `{"fault":{"faultstring":..,"detail":{"errorcode":..}}}`.
	Fault,
	/// Flat `{"message":..,"code":..}` bodies.
	Message,
}
impl ErrorNormalizer for ErrorShape {
	fn normalize(&self, status: u16, body: &[u8]) -> ErrorResult {
		normalize(status, body, *self)
	}
}

/// Normalizes a raw HTTP failure using the given envelope shape.
pub fn normalize(status: u16, body: &[u8], shape: ErrorShape) -> ErrorResult {
	let mut result = ErrorResult::from_status(status);
	let envelope = match serde_json::from_slice::<Value>(body) {
		Ok(value) => extract(&value, shape),
		Err(_) => None,
	};

	match envelope {
		Some(Envelope { code, message }) => {
			if let Some(message) = message.clone().or_else(|| code.clone()) {
				result.message = message;
			}

			result.provider_code = code;
		},
		None =>
			if let Some(preview) = body_preview(body) {
				result.message = preview;
			},
	}

	result
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Envelope {
	code: Option<String>,
	message: Option<String>,
}

fn extract(value: &Value, shape: ErrorShape) -> Option<Envelope> {
	match shape {
		ErrorShape::Auto => [
			ErrorShape::ErrorsArray,
			ErrorShape::Fault,
			ErrorShape::StatusError,
			ErrorShape::OAuth,
			ErrorShape::Message,
		]
		.into_iter()
		.find_map(|shape| extract(value, shape)),
		ErrorShape::ErrorsArray => {
			let first = value.get("errors")?.as_array()?.first()?;

			envelope(
				scalar(first.get("code")),
				text(first.get("detail")).or_else(|| text(first.get("title"))),
			)
		},
		ErrorShape::StatusError => {
			let status = text(value.get("status"))?;

			if !status.eq_ignore_ascii_case("error") && !status.eq_ignore_ascii_case("fail") {
				return None;
			}

			envelope(
				scalar(value.get("error")),
				text(value.get("message")).or_else(|| text(value.get("debug"))),
			)
		},
		ErrorShape::OAuth => {
			let code = text(value.get("error"))?;

			envelope(
				Some(code),
				["error_description", "description", "message"]
					.into_iter()
					.find_map(|field| text(value.get(field))),
			)
		},
		ErrorShape::Fault => {
			let fault = value.get("fault")?;

			envelope(
				scalar(fault.pointer("/detail/errorcode")),
				text(fault.get("faultstring")),
			)
		},
		ErrorShape::Message => envelope(
			scalar(value.get("code")).or_else(|| scalar(value.get("error_code"))),
			text(value.get("message")),
		),
	}
}

fn envelope(code: Option<String>, message: Option<String>) -> Option<Envelope> {
	if code.is_none() && message.is_none() { None } else { Some(Envelope { code, message }) }
}

fn text(value: Option<&Value>) -> Option<String> {
	value?.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

fn scalar(value: Option<&Value>) -> Option<String> {
	match value? {
		Value::Number(number) => Some(number.to_string()),
		other => text(Some(other)),
	}
}

fn body_preview(body: &[u8]) -> Option<String> {
	let body = String::from_utf8_lossy(body);
	let body = body.trim();

	if body.is_empty() {
		return None;
	}
	if body.chars().count() <= ErrorResult::BODY_PREVIEW_LIMIT {
		return Some(body.to_owned());
	}

	let mut buf = body.chars().take(ErrorResult::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	Some(buf)
}
