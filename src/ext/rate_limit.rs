//! Rate limit policy contracts consulted before every physical send.

// self
use crate::{_prelude::*, auth::ProviderId, http::Method};

/// Boxed future returned by [`RateLimitPolicy::evaluate`].
pub type RateLimitFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RateLimitDecision>> + 'a + Send>>;

/// Strategy that inspects provider budgets before the client hits the network.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Evaluates whether the next attempt should be delayed.
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_>;
}

/// Context shared with a [`RateLimitPolicy`] before an outbound attempt.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Provider identifier for the call.
	pub provider_id: ProviderId,
	/// HTTP method of the attempt.
	pub method: Method,
	/// URL path of the attempt.
	pub path: String,
	/// 1-based physical attempt number.
	pub attempt: u32,
	/// Timestamp observed before invoking the policy.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a new context for the given provider/method/path tuple.
	pub fn new(
		provider_id: ProviderId,
		method: Method,
		path: impl Into<String>,
		attempt: u32,
	) -> Self {
		Self {
			provider_id,
			method,
			path: path.into(),
			attempt,
			observed_at: OffsetDateTime::now_utc(),
		}
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Allow,
	/// The request should be delayed.
	Delay(RetryDirective),
}

/// Advises the client how long to hold an attempt after [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to send.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested wait.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Spaces consecutive attempts to one provider by at least `interval`.
///
/// Public travel APIs often publish a requests-per-second quota per key; a shared instance
/// keeps every adapter using that key under it.
#[derive(Debug)]
pub struct MinInterval {
	interval: Duration,
	next_slot: Mutex<HashMap<ProviderId, OffsetDateTime>>,
}
impl MinInterval {
	/// Creates a policy allowing one attempt per `interval` and provider.
	pub fn new(interval: Duration) -> Self {
		Self { interval, next_slot: Default::default() }
	}

	/// Creates a policy allowing `per_second` attempts per second and provider.
	pub fn per_second(per_second: u32) -> Self {
		Self::new(Duration::SECOND / per_second.max(1))
	}

	fn decide(&self, context: &RateLimitContext) -> RateLimitDecision {
		let now = context.observed_at;
		let mut slots = self.next_slot.lock();
		let slot = slots.entry(context.provider_id.clone()).or_insert(now);

		if *slot <= now {
			*slot = now + self.interval;

			return RateLimitDecision::Allow;
		}

		let earliest = *slot;

		*slot = earliest + self.interval;

		RateLimitDecision::Delay(
			RetryDirective::new(earliest, earliest - now).with_reason("Provider request quota."),
		)
	}
}
impl RateLimitPolicy for MinInterval {
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_> {
		let decision = self.decide(context);

		Box::pin(async move { Ok(decision) })
	}
}
