//! In-memory [`StateStore`] used by tests, demos, and single-node deployments.

// self
use crate::{
	_prelude::*,
	auth::StateScope,
	csrf::{PendingAuthState, STATE_TTL, StateStore},
	store::StoreFuture,
};

/// Keeps pending states in a process-local map guarded by a single lock.
#[derive(Clone, Debug)]
pub struct MemoryStateStore {
	states: Arc<Mutex<HashMap<StateScope, PendingAuthState>>>,
	ttl: Duration,
}
impl MemoryStateStore {
	/// Creates a store whose states expire after `ttl` instead of the default ten minutes.
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { states: Default::default(), ttl }
	}

	/// Configured time to live.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Number of stored (possibly expired) states.
	pub fn len(&self) -> usize {
		self.states.lock().len()
	}

	/// Returns true when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.states.lock().is_empty()
	}
}
impl Default for MemoryStateStore {
	fn default() -> Self {
		Self::with_ttl(STATE_TTL)
	}
}
impl StateStore for MemoryStateStore {
	fn issue_at<'a>(
		&'a self,
		scope: &'a StateScope,
		now: OffsetDateTime,
	) -> StoreFuture<'a, PendingAuthState> {
		Box::pin(async move {
			let state = PendingAuthState::mint(scope.clone(), now, self.ttl);
			let mut states = self.states.lock();

			// Abandoned flows are reclaimed here so the table stays bounded by live states.
			states.retain(|_, pending| !pending.is_expired_at(now));
			states.insert(scope.clone(), state.clone());

			Ok(state)
		})
	}

	fn consume_at<'a>(
		&'a self,
		scope: &'a StateScope,
		token: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let mut states = self.states.lock();
			let Some(stored) = states.get(scope) else {
				return Ok(false);
			};

			if stored.is_expired_at(now) {
				states.remove(scope);

				return Ok(false);
			}
			if !stored.matches(token) {
				return Ok(false);
			}

			states.remove(scope);

			Ok(true)
		})
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let mut states = self.states.lock();
			let before = states.len();

			states.retain(|_, state| !state.is_expired_at(now));

			Ok(before - states.len())
		})
	}
}
