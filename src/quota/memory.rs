//! In-memory [`QuotaLedger`] that retains every window for audit.

// self
use crate::{
	_prelude::*,
	auth::{Identity, ProviderId},
	quota::{QuotaCounter, QuotaDecision, QuotaKey, QuotaLedger, window_of},
	store::StoreFuture,
};

type CounterMap = BTreeMap<(QuotaKey, Date), QuotaCounter>;

/// Ledger backed by a single process-local map; every evaluation happens under one lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger(Arc<Mutex<CounterMap>>);
impl MemoryLedger {
	/// Number of retained rows across all keys and windows.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns true when no row exists.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}
impl QuotaLedger for MemoryLedger {
	fn check_and_increment<'a>(
		&'a self,
		key: &'a QuotaKey,
		amount: u64,
		limit: u64,
		at: OffsetDateTime,
	) -> StoreFuture<'a, QuotaDecision> {
		Box::pin(async move {
			let window = window_of(at);
			let mut rows = self.0.lock();
			let counter = rows
				.entry((key.clone(), window))
				.or_insert_with(|| QuotaCounter::open(key, window, limit));

			Ok(counter.charge(amount, limit))
		})
	}

	fn ensure_window<'a>(
		&'a self,
		key: &'a QuotaKey,
		limit: u64,
		at: OffsetDateTime,
	) -> StoreFuture<'a, QuotaCounter> {
		Box::pin(async move {
			let window = window_of(at);
			let mut rows = self.0.lock();
			let counter = rows
				.entry((key.clone(), window))
				.or_insert_with(|| QuotaCounter::open(key, window, limit));

			counter.limit = limit;

			Ok(counter.clone())
		})
	}

	fn current<'a>(
		&'a self,
		key: &'a QuotaKey,
		at: OffsetDateTime,
	) -> StoreFuture<'a, Option<QuotaCounter>> {
		Box::pin(async move { Ok(self.0.lock().get(&(key.clone(), window_of(at))).cloned()) })
	}

	fn history<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Vec<QuotaCounter>> {
		Box::pin(async move {
			let mut rows: Vec<QuotaCounter> = self
				.0
				.lock()
				.values()
				.filter(|counter| &counter.identity == identity && counter.provider == provider)
				.cloned()
				.collect();

			rows.sort_by(|a, b| {
				a.window_start.cmp(&b.window_start).then_with(|| a.metric.cmp(&b.metric))
			});

			Ok(rows)
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	use tokio::runtime::Runtime;
	// self
	use super::*;

	#[test]
	fn new_days_open_new_rows_and_keep_old_ones() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for ledger test.");
		let ledger = MemoryLedger::default();
		let identity = Identity::new("a@x.com").expect("Identity fixture should be valid.");
		let key = QuotaKey::new(&identity, ProviderId::Twitter, "searches");
		let day_one = datetime!(2026-03-01 23:59 UTC);
		let day_two = datetime!(2026-03-02 00:01 UTC);

		for _ in 0..10 {
			assert!(
				rt.block_on(ledger.check_and_increment(&key, 1, 10, day_one))
					.expect("Charge should succeed.")
					.allowed
			);
		}

		assert!(
			!rt.block_on(ledger.check_and_increment(&key, 1, 10, day_one))
				.expect("Charge should succeed.")
				.allowed
		);

		let fresh = rt
			.block_on(ledger.check_and_increment(&key, 1, 10, day_two))
			.expect("Charge should succeed.");

		assert!(fresh.allowed);
		assert_eq!(fresh.count, 1);

		let history = rt
			.block_on(ledger.history(&identity, ProviderId::Twitter))
			.expect("History should load.");

		assert_eq!(history.len(), 2);
		assert_eq!(history[0].count, 10);
		assert_eq!(history[1].count, 1);
	}

	#[test]
	fn ensure_window_is_idempotent() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for ledger test.");
		let ledger = MemoryLedger::default();
		let identity = Identity::new("a@x.com").expect("Identity fixture should be valid.");
		let key = QuotaKey::new(&identity, ProviderId::Twitter, "tweets");
		let at = datetime!(2026-03-01 08:00 UTC);

		rt.block_on(ledger.check_and_increment(&key, 3, 100, at)).expect("Charge should succeed.");

		let counter =
			rt.block_on(ledger.ensure_window(&key, 200, at)).expect("Ensure should succeed.");

		assert_eq!(counter.count, 3);
		assert_eq!(counter.limit, 200);
		assert_eq!(ledger.len(), 1);
		assert!(
			rt.block_on(ledger.current(&key, datetime!(2026-03-02 08:00 UTC)))
				.expect("Lookup should succeed.")
				.is_none()
		);
	}
}
