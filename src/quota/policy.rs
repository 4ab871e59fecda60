//! Per-plan daily limits for quota-tracked providers.

// std
use std::collections::BTreeSet;
// self
use crate::{_prelude::*, auth::ProviderId};

/// Billing plan that selects the daily limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
	/// Entry plan; tracked metrics default to a zero allowance.
	#[default]
	Free,
	/// Individual paid plan.
	Pro,
	/// Team plan.
	Teams,
}
impl PlanTier {
	/// Every plan, cheapest first.
	pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Teams];

	/// Stable lowercase label.
	pub const fn as_str(self) -> &'static str {
		match self {
			PlanTier::Free => "free",
			PlanTier::Pro => "pro",
			PlanTier::Teams => "teams",
		}
	}
}
impl Display for PlanTier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

type PlanLimits = BTreeMap<PlanTier, BTreeMap<String, u64>>;

/// Daily limits keyed by provider, plan, and metric.
///
/// A metric is tracked for a provider once any plan configures it; plans that omit a tracked
/// metric get a zero allowance.
///
/// ```toml
/// [quota.twitter.pro]
/// searches = 10
/// tweets = 100
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaPolicy(BTreeMap<ProviderId, PlanLimits>);
impl QuotaPolicy {
	/// Policy without any tracked provider.
	pub fn empty() -> Self {
		Self(BTreeMap::new())
	}

	/// Sets the daily `limit` of `metric` for `provider` on `plan`.
	pub fn with_limit(
		mut self,
		provider: ProviderId,
		plan: PlanTier,
		metric: impl Into<String>,
		limit: u64,
	) -> Self {
		self.0.entry(provider).or_default().entry(plan).or_default().insert(metric.into(), limit);

		self
	}

	/// Returns true when `provider` has at least one tracked metric.
	pub fn is_tracked(&self, provider: ProviderId) -> bool {
		!self.metrics(provider).is_empty()
	}

	/// Tracked metric names for `provider`, sorted.
	pub fn metrics(&self, provider: ProviderId) -> BTreeSet<&str> {
		self.0
			.get(&provider)
			.into_iter()
			.flat_map(|plans| plans.values())
			.flat_map(|metrics| metrics.keys().map(String::as_str))
			.collect()
	}

	/// Daily limit for the metric, or `None` when the metric is not tracked for `provider`.
	pub fn limit(&self, provider: ProviderId, plan: PlanTier, metric: &str) -> Option<u64> {
		if !self.metrics(provider).contains(metric) {
			return None;
		}

		let configured = self.0.get(&provider).and_then(|plans| plans.get(&plan));

		Some(configured.and_then(|metrics| metrics.get(metric)).copied().unwrap_or(0))
	}
}
impl Default for QuotaPolicy {
	fn default() -> Self {
		Self::empty()
			.with_limit(ProviderId::Twitter, PlanTier::Free, "searches", 0)
			.with_limit(ProviderId::Twitter, PlanTier::Free, "tweets", 0)
			.with_limit(ProviderId::Twitter, PlanTier::Pro, "searches", 10)
			.with_limit(ProviderId::Twitter, PlanTier::Pro, "tweets", 100)
			.with_limit(ProviderId::Twitter, PlanTier::Teams, "searches", 20)
			.with_limit(ProviderId::Twitter, PlanTier::Teams, "tweets", 200)
	}
}
