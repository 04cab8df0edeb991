// self
use crate::{_prelude::*, obs::FlowKind, refresh::RetryDecision};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by pipeline flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("bearer_pipeline.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

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

/// Fields describing how a refresh round ended.
#[derive(Clone, Debug)]
pub struct RoundReport<'a> {
	/// Round identifier.
	pub round: u64,
	/// Waiters resolved by the round, the leader included.
	pub waiters: usize,
	/// Decision delivered to every waiter.
	pub decision: RetryDecision,
	/// Fingerprint of the refresh credential the round used, if any.
	pub refresh_fingerprint: Option<&'a str>,
	/// Failure reason, if the round failed.
	pub failure: Option<String>,
}

/// Emits a `bearer_pipeline.round` event (when tracing is enabled).
pub fn trace_round(report: &RoundReport<'_>) {
	#[cfg(feature = "tracing")]
	{
		match &report.failure {
			Some(failure) => tracing::warn!(
				target: "bearer_pipeline.round",
				round = report.round,
				waiters = report.waiters,
				decision = report.decision.as_str(),
				refresh = report.refresh_fingerprint,
				error = %failure,
				"refresh round failed"
			),
			None => tracing::debug!(
				target: "bearer_pipeline.round",
				round = report.round,
				waiters = report.waiters,
				decision = report.decision.as_str(),
				refresh = report.refresh_fingerprint,
				"refresh round resolved"
			),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = report;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn trace_round_noop_without_tracing() {
		trace_round(&RoundReport {
			round: 1,
			waiters: 2,
			decision: RetryDecision::DoNotRetry,
			refresh_fingerprint: None,
			failure: Some("refresh rejected".into()),
		});
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
