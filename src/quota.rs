//! Quota Ledger: per-identity, per-provider daily usage counters.
//!
//! Windows are UTC calendar days. Each window is its own [`QuotaCounter`] row, so earlier days stay
//! inspectable through [`QuotaLedger::history`]. A charge that would push the count past the limit
//! is rejected without touching the counter.

pub mod memory;
pub mod policy;

pub use memory::MemoryLedger;
pub use policy::*;

// crates.io
use time::UtcOffset;
// self
use crate::{
	_prelude::*,
	auth::{Identity, LinkedCredential, ProviderId},
	error::ConfigError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionAuthority,
	store::{StoreFuture, TokenVault},
};

/// Key of a counter series (`quota_counters` without the window column).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuotaKey {
	/// Identity that owns the linked credential.
	pub identity: Identity,
	/// Provider the usage is charged against.
	pub provider: ProviderId,
	/// Metric name (e.g. `searches`).
	pub metric: String,
}
impl QuotaKey {
	/// Builds a key for the identity/provider/metric triple.
	pub fn new(identity: &Identity, provider: ProviderId, metric: impl Into<String>) -> Self {
		Self { identity: identity.clone(), provider, metric: metric.into() }
	}
}

/// One row of `quota_counters`: usage for a single window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounter {
	/// Identity that owns the counter.
	pub identity: Identity,
	/// Provider the usage is charged against.
	pub provider: ProviderId,
	/// Metric name.
	pub metric: String,
	/// UTC day the window covers.
	pub window_start: Date,
	/// Units consumed in the window.
	pub count: u64,
	/// Limit in force at the last evaluation.
	pub limit: u64,
}
impl QuotaCounter {
	/// Empty counter for `key` in `window_start`.
	pub fn open(key: &QuotaKey, window_start: Date, limit: u64) -> Self {
		Self {
			identity: key.identity.clone(),
			provider: key.provider,
			metric: key.metric.clone(),
			window_start,
			count: 0,
			limit,
		}
	}

	/// Units still available in the window.
	pub fn remaining(&self) -> u64 {
		self.limit.saturating_sub(self.count)
	}

	/// Evaluates a charge of `amount` against `limit`, applying it only when allowed.
	pub fn charge(&mut self, amount: u64, limit: u64) -> QuotaDecision {
		self.limit = limit;

		let allowed = self.count.checked_add(amount).is_some_and(|next| next <= limit);

		if allowed {
			self.count += amount;
		}

		QuotaDecision {
			allowed,
			remaining: self.remaining(),
			count: self.count,
			limit,
			window_start: self.window_start,
		}
	}

	/// Public view returned by the quota read endpoint.
	pub fn view(&self) -> QuotaView {
		QuotaView {
			count: self.count,
			limit: self.limit,
			window_start: self.window_start.to_string(),
		}
	}
}

/// Result of [`QuotaLedger::check_and_increment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
	/// Whether the charge was applied.
	pub allowed: bool,
	/// Units left after the evaluation.
	pub remaining: u64,
	/// Counter value after the evaluation.
	pub count: u64,
	/// Limit used for the evaluation.
	pub limit: u64,
	/// Window the decision belongs to.
	pub window_start: Date,
}

/// Serialized counter shape: `{count, limit, windowStart}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaView {
	/// Units consumed today.
	pub count: u64,
	/// Daily limit for the caller's plan.
	pub limit: u64,
	/// UTC day of the window, `YYYY-MM-DD`.
	pub window_start: String,
}

/// Storage contract for daily counters.
///
/// Implementations must evaluate and apply
/// [`check_and_increment`](QuotaLedger::check_and_increment) atomically per key so concurrent
/// charges can never push a window past its limit.
pub trait QuotaLedger
where
	Self: Send + Sync,
{
	/// Charges `amount` units for the window containing `at`, creating the row lazily.
	fn check_and_increment<'a>(
		&'a self,
		key: &'a QuotaKey,
		amount: u64,
		limit: u64,
		at: OffsetDateTime,
	) -> StoreFuture<'a, QuotaDecision>;

	/// Creates the row for the window containing `at` if missing, refreshing its limit.
	fn ensure_window<'a>(
		&'a self,
		key: &'a QuotaKey,
		limit: u64,
		at: OffsetDateTime,
	) -> StoreFuture<'a, QuotaCounter>;

	/// Row for the window containing `at`, if one exists.
	fn current<'a>(
		&'a self,
		key: &'a QuotaKey,
		at: OffsetDateTime,
	) -> StoreFuture<'a, Option<QuotaCounter>>;

	/// Every retained row for the identity/provider pair, oldest window first.
	fn history<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Vec<QuotaCounter>>;
}

/// UTC day containing `at`.
pub fn window_of(at: OffsetDateTime) -> Date {
	at.to_offset(UtcOffset::UTC).date()
}

/// Start of the window following the one containing `at` (next UTC midnight).
pub fn next_reset(at: OffsetDateTime) -> OffsetDateTime {
	window_of(at).next_day().unwrap_or(Date::MAX).midnight().assume_utc()
}

/// Quota enforcement facade: resolves plan limits through the Session Authority and charges the
/// ledger.
#[derive(Clone)]
pub struct QuotaGate {
	ledger: Arc<dyn QuotaLedger>,
	policy: Arc<QuotaPolicy>,
	sessions: Arc<dyn SessionAuthority>,
	vault: Arc<dyn TokenVault>,
}
impl QuotaGate {
	/// Wires the gate to its collaborators.
	pub fn new(
		ledger: Arc<dyn QuotaLedger>,
		policy: QuotaPolicy,
		sessions: Arc<dyn SessionAuthority>,
		vault: Arc<dyn TokenVault>,
	) -> Self {
		Self { ledger, policy: Arc::new(policy), sessions, vault }
	}

	/// Active policy.
	pub fn policy(&self) -> &QuotaPolicy {
		&self.policy
	}

	async fn limit_for(&self, key: &QuotaKey) -> Result<u64> {
		let claims = self.sessions.claims(&key.identity).await?;

		self.policy.limit(key.provider, claims.plan, &key.metric).ok_or_else(|| {
			ConfigError::UntrackedMetric { provider: key.provider, metric: key.metric.clone() }
				.into()
		})
	}

	/// Charges `amount` units of `metric` right now.
	pub async fn check_and_increment(
		&self,
		identity: &Identity,
		provider: ProviderId,
		metric: &str,
		amount: u64,
	) -> Result<QuotaDecision> {
		self.check_and_increment_at(identity, provider, metric, amount, OffsetDateTime::now_utc())
			.await
	}

	/// Charges `amount` units of `metric` in the window containing `at`.
	pub async fn check_and_increment_at(
		&self,
		identity: &Identity,
		provider: ProviderId,
		metric: &str,
		amount: u64,
		at: OffsetDateTime,
	) -> Result<QuotaDecision> {
		let key = QuotaKey::new(identity, provider, metric);
		let limit = self.limit_for(&key).await?;
		let decision = self.ledger.check_and_increment(&key, amount, limit, at).await?;

		if !decision.allowed {
			obs::record_quota_rejection(provider, metric);
		}

		Ok(decision)
	}

	/// Opens today's rows for every metric tracked for `provider`; a no-op for untracked providers.
	pub async fn initialize_at(
		&self,
		identity: &Identity,
		provider: ProviderId,
		at: OffsetDateTime,
	) -> Result<Vec<QuotaCounter>> {
		if !self.policy.is_tracked(provider) {
			return Ok(Vec::new());
		}

		let claims = self.sessions.claims(identity).await?;
		let mut counters = Vec::new();

		for metric in self.policy.metrics(provider) {
			let key = QuotaKey::new(identity, provider, metric);
			let limit = self.policy.limit(provider, claims.plan, metric).unwrap_or(0);

			counters.push(self.ledger.ensure_window(&key, limit, at).await?);
		}

		Ok(counters)
	}

	/// Current usage of every tracked metric, including metrics with no row yet today.
	pub async fn snapshot_at(
		&self,
		identity: &Identity,
		provider: ProviderId,
		at: OffsetDateTime,
	) -> Result<BTreeMap<String, QuotaView>> {
		let claims = self.sessions.claims(identity).await?;
		let mut snapshot = BTreeMap::new();

		for metric in self.policy.metrics(provider) {
			let key = QuotaKey::new(identity, provider, metric);
			let limit = self.policy.limit(provider, claims.plan, metric).unwrap_or(0);
			let counter = match self.ledger.current(&key, at).await? {
				Some(mut counter) => {
					counter.limit = limit;

					counter
				},
				None => QuotaCounter::open(&key, window_of(at), limit),
			};

			snapshot.insert(metric.to_owned(), counter.view());
		}

		Ok(snapshot)
	}

	/// Fetches the linked credential and charges `amount` units of `metric` in one step.
	///
	/// Fails with [`Error::QuotaExceeded`] (carrying the remaining allowance and the next reset)
	/// when the charge is rejected, and with [`Error::NotLinked`] when no credential exists.
	pub async fn use_credential_at(
		&self,
		identity: &Identity,
		provider: ProviderId,
		metric: &str,
		amount: u64,
		at: OffsetDateTime,
	) -> Result<LinkedCredential> {
		let span = FlowSpan::new(FlowKind::Quota, "use_credential");

		obs::record_flow_outcome(FlowKind::Quota, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credential = self
					.vault
					.get(identity, provider)
					.await?
					.ok_or(Error::NotLinked { provider })?;
				let decision =
					self.check_and_increment_at(identity, provider, metric, amount, at).await?;

				if !decision.allowed {
					return Err(Error::QuotaExceeded {
						provider,
						metric: metric.to_owned(),
						limit: decision.limit,
						remaining: decision.remaining,
						resets_at: next_reset(at),
					});
				}

				Ok(credential)
			})
			.await;

		obs::record_result(FlowKind::Quota, &result);

		result
	}

	/// [`use_credential_at`](QuotaGate::use_credential_at) using the current clock.
	pub async fn use_credential(
		&self,
		identity: &Identity,
		provider: ProviderId,
		metric: &str,
		amount: u64,
	) -> Result<LinkedCredential> {
		self.use_credential_at(identity, provider, metric, amount, OffsetDateTime::now_utc()).await
	}

	/// Every retained window for the identity/provider pair.
	pub async fn history(
		&self,
		identity: &Identity,
		provider: ProviderId,
	) -> Result<Vec<QuotaCounter>> {
		Ok(self.ledger.history(identity, provider).await?)
	}
}
impl Debug for QuotaGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("QuotaGate").field("policy", &self.policy).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn key() -> QuotaKey {
		QuotaKey::new(
			&Identity::new("a@x.com").expect("Identity fixture should be valid."),
			ProviderId::Twitter,
			"tweets",
		)
	}

	#[test]
	fn rejected_charges_leave_the_counter_untouched() {
		let window = window_of(datetime!(2026-03-01 12:00 UTC));
		let mut counter = QuotaCounter::open(&key(), window, 100);

		assert!(counter.charge(100, 100).allowed);

		let decision = counter.charge(1, 100);

		assert!(!decision.allowed);
		assert_eq!(decision.remaining, 0);
		assert_eq!(counter.count, 100);
		assert!(!counter.charge(u64::MAX, 100).allowed);
		assert_eq!(counter.count, 100);
	}

	#[test]
	fn windows_are_utc_days() {
		let late_evening_west = datetime!(2026-03-01 23:30 -05:00);

		assert_eq!(window_of(late_evening_west).to_string(), "2026-03-02");
		assert_eq!(next_reset(late_evening_west), datetime!(2026-03-03 00:00 UTC));
		assert_eq!(next_reset(datetime!(2026-03-02 00:00 UTC)), datetime!(2026-03-03 00:00 UTC));
	}

	#[test]
	fn views_use_camel_case_dates() {
		let counter = QuotaCounter::open(&key(), window_of(datetime!(2026-03-01 12:00 UTC)), 10);
		let payload = serde_json::to_value(counter.view()).expect("View should serialize.");

		assert_eq!(
			payload,
			serde_json::json!({ "count": 0, "limit": 10, "windowStart": "2026-03-01" })
		);
	}
}
