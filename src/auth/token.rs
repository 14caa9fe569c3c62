//! Bearer tokens and their lifecycle.

// crates.io
use time::{Date, PrimitiveDateTime, Time};
// self
use crate::{_prelude::*, auth::Secret};

/// Validity of a token at a given instant once the safety margin is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// `now < expires_at - safety_margin`.
	Valid,
	/// The token must be refreshed before it is attached to a request.
	Expired,
}

/// Lifecycle state of one token cache entry as observed by the
/// [`TokenManager`](crate::token::TokenManager).
///
/// `Unauthenticated → Authenticating → Valid → Expired → Authenticating → …`; a failed
/// refresh goes back to `Unauthenticated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
	/// No token is cached.
	Unauthenticated,
	/// A refresh call is in flight.
	Authenticating,
	/// A cached token is usable.
	Valid,
	/// A cached token exists but is inside the safety margin or past expiry.
	Expired,
}

/// OAuth access token issued by a provider's token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Opaque token value; callers must avoid logging it.
	pub value: Secret,
	/// Token type reported by the provider (`Bearer` when omitted).
	pub token_type: String,
	/// Instant the token response was received.
	pub issued_at: OffsetDateTime,
	/// Lifetime reported by the provider.
	pub expires_in: Duration,
	/// `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
	/// Scope string granted by the provider, if reported.
	pub scope: Option<String>,
}
impl AccessToken {
	/// Default token type attached to requests.
	pub const BEARER: &'static str = "Bearer";

	/// Creates a bearer token issued at `issued_at` and living for `expires_in`.
	///
	/// An expiry outside the representable range saturates to the nearest representable day.
	pub fn new(value: impl Into<Secret>, issued_at: OffsetDateTime, expires_in: Duration) -> Self {
		let expires_at = match issued_at.checked_add(expires_in) {
			Some(expires_at) => expires_at,
			None if expires_in.is_negative() =>
				PrimitiveDateTime::new(Date::MIN, Time::MIDNIGHT).assume_utc(),
			None => PrimitiveDateTime::new(Date::MAX, Time::MIDNIGHT).assume_utc(),
		};

		Self::with_expiry(value.into(), issued_at, expires_in, expires_at)
	}

	/// Like [`new`](Self::new) but returns `None` when the expiry is not representable.
	pub fn try_new(
		value: impl Into<Secret>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Option<Self> {
		let expires_at = issued_at.checked_add(expires_in)?;

		Some(Self::with_expiry(value.into(), issued_at, expires_in, expires_at))
	}

	fn with_expiry(
		value: Secret,
		issued_at: OffsetDateTime,
		expires_in: Duration,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			value,
			token_type: Self::BEARER.into(),
			issued_at,
			expires_in,
			expires_at,
			scope: None,
		}
	}

	/// Overrides the token type.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Records the granted scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Computes the status at `instant`, treating the last `safety_margin` as expired.
	pub fn status_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> TokenStatus {
		let cutoff = self.expires_at.checked_sub(safety_margin).unwrap_or(self.expires_at);

		if instant < cutoff {
			TokenStatus::Valid
		} else {
			TokenStatus::Expired
		}
	}

	/// Returns `true` when the token can still be attached at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> bool {
		matches!(self.status_at(instant, safety_margin), TokenStatus::Valid)
	}

	/// Value for the `Authorization` header.
	pub fn authorization(&self) -> String {
		format!("{} {}", self.token_type, self.value.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("value", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}
