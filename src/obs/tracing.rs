// self
use crate::{_prelude::*, normalize::ErrorResult, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used around token refreshes and dispatches.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("provider_broker.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event for a scheduled retry.
pub fn retry_scheduled(attempt: u32, delay: Duration, cause: &ErrorResult) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			attempt,
			delay_ms = delay.whole_milliseconds() as u64,
			kind = cause.kind.as_str(),
			status = cause.http_status,
			"retrying provider call"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay, cause);
	}
}

/// Emits a debug event for a 401 that triggers a token refresh.
pub fn refresh_on_unauthorized(attempt: u32) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, "provider rejected the bearer token; refreshing once");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = attempt;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn op_helpers_noop_without_subscriber() {
		let _span = OpSpan::new(OpKind::Dispatch, "test");

		retry_scheduled(1, Duration::milliseconds(500), &ErrorResult::from_status(503));
		refresh_on_unauthorized(1);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OpSpan::new(OpKind::TokenRefresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
