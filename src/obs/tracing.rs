// self
use crate::{
	_prelude::*,
	obs::{CacheOutcome, FlowKind},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the flow kind, stage, and correlation id.
	pub fn new(kind: FlowKind, stage: &'static str, correlation_id: Uuid) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oidc_broker.flow",
				flow = kind.as_str(),
				stage,
				correlation_id = %correlation_id
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, correlation_id);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
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

pub(crate) fn cache_event(outcome: CacheOutcome, partition: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(outcome = outcome.as_str(), %partition, "token cache lookup");

	#[cfg(not(feature = "tracing"))]
	let _ = (outcome, partition);
}

pub(crate) fn retry_event(attempt: u32, delay: std::time::Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying token exchange");

	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, delay, error);
}

pub(crate) fn poll_event(status: &str, interval: std::time::Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(status, interval_secs = interval.as_secs(), "device code poll");

	#[cfg(not(feature = "tracing"))]
	let _ = (status, interval);
}

pub(crate) fn prune_event(pruned: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(pruned, "pruned expired cache entries");

	#[cfg(not(feature = "tracing"))]
	let _ = pruned;
}

pub(crate) fn uncached_event(kind: FlowKind, reason: &str) {
	#[cfg(feature = "tracing")]
	tracing::info!(flow = kind.as_str(), reason, "token not cached");

	#[cfg(not(feature = "tracing"))]
	let _ = (kind, reason);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Silent, "instrument_wraps_future", Uuid::new_v4());
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[test]
	fn events_accept_plain_values() {
		cache_event(CacheOutcome::Hit, &"partition");
		poll_event("authorization_pending", std::time::Duration::from_secs(5));
		uncached_event(FlowKind::AuthorizationCode, "no account");
	}
}
