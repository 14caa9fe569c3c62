//! Retry budgets and capped exponential backoff with jitter.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	normalize::{ErrorKind, ErrorResult},
};

type RetryPredicate = Arc<dyn Fn(&ErrorResult) -> bool + Send + Sync>;

/// Errors raised while validating a [`RetryPolicy`].
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum RetryPolicyError {
	/// At least one attempt is required.
	#[error("Retry policy must allow at least one attempt.")]
	ZeroAttempts,
	/// Base delay must not exceed the cap.
	#[error("Retry base delay {base} exceeds the maximum delay {max}.")]
	BaseExceedsMax {
		/// Configured base delay.
		base: Duration,
		/// Configured maximum delay.
		max: Duration,
	},
	/// Delays must be non-negative.
	#[error("Retry delays must not be negative.")]
	NegativeDelay,
	/// Jitter must lie within `[0, 1]`.
	#[error("Retry jitter fraction {jitter} is outside [0, 1].")]
	JitterOutOfRange {
		/// Configured jitter fraction.
		jitter: f64,
	},
}

/// How many attempts a call may take and how long to wait between them.
///
/// The delay after failed attempt `n` (1-based) is
/// `min(max_delay, base_delay * 2^(n-1))`, scaled by a uniform factor in
/// `[1 - jitter_fraction, 1 + jitter_fraction]`.
#[derive(Clone)]
pub struct RetryPolicy {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Upper bound for the un-jittered delay and for Retry-After stretching.
	pub max_delay: Duration,
	/// Relative jitter applied to every delay.
	pub jitter_fraction: f64,
	retryable: RetryPredicate,
}
impl RetryPolicy {
	/// Default attempt budget.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// Default base delay.
	pub const DEFAULT_BASE_DELAY: Duration = Duration::milliseconds(500);
	/// Default delay cap.
	pub const DEFAULT_MAX_DELAY: Duration = Duration::seconds(10);
	/// Default jitter fraction.
	pub const DEFAULT_JITTER: f64 = 0.2;

	/// Creates a policy with the given budget and delays and the default jitter.
	pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
		Self { max_attempts, base_delay, max_delay, ..Default::default() }
	}

	/// A policy that never retries.
	pub fn no_retry() -> Self {
		Self::new(1, Duration::ZERO, Duration::ZERO)
	}

	/// Overrides the jitter fraction.
	pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
		self.jitter_fraction = jitter_fraction;

		self
	}

	/// Replaces the predicate deciding which failures consume a retry.
	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Fn(&ErrorResult) -> bool + Send + Sync,
	{
		self.retryable = Arc::new(predicate);

		self
	}

	/// Checks the invariants the dispatch loop relies on.
	pub fn validate(&self) -> Result<(), RetryPolicyError> {
		if self.max_attempts == 0 {
			return Err(RetryPolicyError::ZeroAttempts);
		}
		if self.base_delay.is_negative() || self.max_delay.is_negative() {
			return Err(RetryPolicyError::NegativeDelay);
		}
		if self.base_delay > self.max_delay {
			return Err(RetryPolicyError::BaseExceedsMax {
				base: self.base_delay,
				max: self.max_delay,
			});
		}
		if !(0.0..=1.0).contains(&self.jitter_fraction) {
			return Err(RetryPolicyError::JitterOutOfRange { jitter: self.jitter_fraction });
		}

		Ok(())
	}

	/// Returns `true` when `error` may consume another generic attempt.
	///
	/// `Unauthorized` is never retried here; the client handles it with a token refresh.
	pub fn should_retry(&self, error: &ErrorResult) -> bool {
		error.kind != ErrorKind::Unauthorized && (self.retryable)(error)
	}

	/// Un-jittered delay after failed attempt `attempt` (1-based).
	pub fn base_delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(30);
		let delay = self.base_delay.saturating_mul(1_i32 << exponent);

		delay.min(self.max_delay)
	}

	/// Jittered delay after failed attempt `attempt`, drawing from `rng`.
	pub fn delay_for<R>(&self, attempt: u32, rng: &mut R) -> Duration
	where
		R: Rng + ?Sized,
	{
		let delay = self.base_delay_for(attempt);

		if self.jitter_fraction <= 0.0 || delay.is_zero() {
			return delay;
		}

		let factor = rng.random_range(1.0 - self.jitter_fraction..=1.0 + self.jitter_fraction);

		delay * factor
	}

	/// Delay to wait before the next attempt, stretched by an upstream Retry-After hint.
	pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		let delay = self.delay_for(attempt, &mut rand::rng());

		match retry_after {
			Some(hint) if hint > delay => hint.min(self.max_delay),
			_ => delay,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			jitter_fraction: Self::DEFAULT_JITTER,
			retryable: Arc::new(|error| error.retryable),
		}
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("max_attempts", &self.max_attempts)
			.field("base_delay", &self.base_delay)
			.field("max_delay", &self.max_delay)
			.field("jitter_fraction", &self.jitter_fraction)
			.finish_non_exhaustive()
	}
}
