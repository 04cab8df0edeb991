// self
use crate::{
	obs::{FlowKind, FlowOutcome},
	refresh::RetryDecision,
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_pipeline_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many waiters a round resolved with `decision` (when enabled).
pub fn record_retry_decisions(decision: RetryDecision, waiters: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_pipeline_retry_decision_total",
			"decision" => decision.as_str()
		)
		.increment(waiters as u64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (decision, waiters);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Request, FlowOutcome::Failure);
		record_retry_decisions(RetryDecision::Retry, 3);
	}
}
