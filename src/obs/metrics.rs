// self
use crate::{
	auth::ProviderId,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_linker_flow_total",
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

/// Counts a quota charge that was rejected because the window is exhausted.
pub fn record_quota_rejection(provider: ProviderId, metric: &str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_linker_quota_rejections_total",
			"provider" => provider.as_str(),
			"metric" => metric.to_owned()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (provider, metric);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Complete, FlowOutcome::Failure);
		record_quota_rejection(ProviderId::Twitter, "searches");
	}
}
