//! CSRF State Store: single-use anti-forgery tokens for custom-flow authorizations.
//!
//! A [`PendingAuthState`] lives between "authorization start" and "authorization complete" and is
//! bound to a [`StateScope`] (the provider plus the initiating client). Issuing again for the same
//! scope replaces the previous state, so each client has at most one attempt in flight per
//! provider. [`StateStore::consume_at`] is an atomic check-and-delete.

pub mod memory;

pub use memory::MemoryStateStore;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
// self
use crate::{_prelude::*, auth::StateScope, store::StoreFuture};

/// Lifetime of a pending authorization state.
pub const STATE_TTL: Duration = Duration::minutes(10);

const STATE_BYTES: usize = 32;

/// Record persisted in `pending_auth_states` while a custom-flow authorization is in flight.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthState {
	/// Client binding the state was issued for.
	pub scope: StateScope,
	/// Opaque random token embedded in the authorization URL.
	pub state_token: String,
	/// Issue instant.
	pub created_at: OffsetDateTime,
	/// Time to live from `created_at`.
	pub ttl: Duration,
}
impl PendingAuthState {
	/// Mints a fresh random state for `scope`.
	pub fn mint(scope: StateScope, created_at: OffsetDateTime, ttl: Duration) -> Self {
		Self { scope, state_token: mint_token(), created_at, ttl }
	}

	/// Instant after which the state can no longer be consumed.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.created_at + self.ttl
	}

	/// Returns true once `instant` reached the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at()
	}

	/// Exact, length-independent comparison against a callback-supplied token.
	pub fn matches(&self, candidate: &str) -> bool {
		let expected = self.state_token.as_bytes();
		let candidate = candidate.as_bytes();

		if expected.len() != candidate.len() {
			return false;
		}

		expected.iter().zip(candidate).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
	}
}
impl Debug for PendingAuthState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingAuthState")
			.field("scope", &self.scope)
			.field("state_token", &"<redacted>")
			.field("created_at", &self.created_at)
			.field("ttl", &self.ttl)
			.finish()
	}
}

/// Scoped acquisition of single-use tokens with guaranteed expiry.
///
/// The concrete backend may be a server-side cache, a database table, or anything else that can
/// perform [`consume_at`](StateStore::consume_at) atomically: under concurrent callbacks
/// presenting the same token, at most one call may return `true`.
pub trait StateStore
where
	Self: Send + Sync,
{
	/// Issues a new state for `scope` at `now`, replacing any previous one for the same scope.
	fn issue_at<'a>(
		&'a self,
		scope: &'a StateScope,
		now: OffsetDateTime,
	) -> StoreFuture<'a, PendingAuthState>;

	/// Atomically checks `token` against the stored state and deletes it on an exact match.
	///
	/// Expired states behave as if they never existed.
	fn consume_at<'a>(
		&'a self,
		scope: &'a StateScope,
		token: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, bool>;

	/// Drops every state that expired before `now`, returning how many were removed.
	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;

	/// [`issue_at`](StateStore::issue_at) using the current clock.
	fn issue<'a>(&'a self, scope: &'a StateScope) -> StoreFuture<'a, PendingAuthState> {
		self.issue_at(scope, OffsetDateTime::now_utc())
	}

	/// [`consume_at`](StateStore::consume_at) using the current clock.
	fn consume<'a>(&'a self, scope: &'a StateScope, token: &'a str) -> StoreFuture<'a, bool> {
		self.consume_at(scope, token, OffsetDateTime::now_utc())
	}
}

/// Generates a URL-safe random token with 256 bits of entropy.
pub fn mint_token() -> String {
	let mut bytes = [0_u8; STATE_BYTES];

	rand::rng().fill(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn tokens_are_url_safe_and_unique() {
		let a = mint_token();
		let b = mint_token();

		assert_ne!(a, b);
		assert_eq!(a.len(), 43);
		assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
	}

	#[test]
	fn matching_is_exact() {
		let scope = StateScope::new("tiktok:client").expect("Scope fixture should be valid.");
		let state = PendingAuthState::mint(scope, OffsetDateTime::now_utc(), STATE_TTL);
		let token = state.state_token.clone();

		assert!(state.matches(&token));
		assert!(!state.matches(&token[..token.len() - 1]));
		assert!(!state.matches(&format!("{token}x")));
		assert!(!state.matches(""));
	}

	#[test]
	fn expiry_is_inclusive_of_the_ttl_boundary() {
		let scope = StateScope::new("tiktok:client").expect("Scope fixture should be valid.");
		let now = OffsetDateTime::now_utc();
		let state = PendingAuthState::mint(scope, now, STATE_TTL);

		assert!(!state.is_expired_at(now + Duration::minutes(9)));
		assert!(state.is_expired_at(now + STATE_TTL));
		assert!(!format!("{state:?}").contains(&state.state_token));
	}
}
