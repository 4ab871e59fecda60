#![cfg(feature = "test")]

// crates.io
use time::macros;
// self
use oauth2_linker::{
	_preludet::*,
	auth::{ProviderId, StateScope},
	csrf::{MemoryStateStore, StateStore},
};

fn scope(binding: &str) -> StateScope {
	StateScope::for_client(ProviderId::TikTok, binding)
		.expect("Scope fixture should be valid for state store tests.")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_consumers_see_exactly_one_success() {
	let store = Arc::new(MemoryStateStore::default());
	let scope = scope("browser-1");
	let issued = store.issue(&scope).await.expect("Issuing state should succeed.");
	let mut handles = Vec::new();

	for _ in 0..32 {
		let store = store.clone();
		let scope = scope.clone();
		let token = issued.state_token.clone();

		handles.push(tokio::spawn(async move { store.consume(&scope, &token).await }));
	}

	let mut accepted = 0;

	for handle in handles {
		let consumed = handle
			.await
			.expect("Consumer task should not panic.")
			.expect("Consume should succeed.");

		if consumed {
			accepted += 1;
		}
	}

	assert_eq!(accepted, 1);
	assert!(store.is_empty());
}

#[tokio::test]
async fn states_expire_after_their_ttl() {
	let store = MemoryStateStore::with_ttl(Duration::minutes(10));
	let scope = scope("browser-1");
	let issued_at = macros::datetime!(2025-11-10 12:00 UTC);
	let state = store.issue_at(&scope, issued_at).await.expect("Issuing state should succeed.");

	assert!(
		!store
			.consume_at(&scope, &state.state_token, issued_at + Duration::minutes(11))
			.await
			.expect("Consume should succeed.")
	);
	// Expired states are gone for good, even if the clock were to run backwards.
	assert!(
		!store
			.consume_at(&scope, &state.state_token, issued_at)
			.await
			.expect("Consume should succeed.")
	);
}

#[tokio::test]
async fn states_are_bound_to_their_client_scope() {
	let store = MemoryStateStore::default();
	let owner = scope("browser-1");
	let attacker = scope("browser-2");
	let state = store.issue(&owner).await.expect("Issuing state should succeed.");

	assert!(
		!store.consume(&attacker, &state.state_token).await.expect("Consume should succeed."),
		"A state minted for one client must not validate for another."
	);
	assert!(store.consume(&owner, &state.state_token).await.expect("Consume should succeed."));
}

#[tokio::test]
async fn reissuing_replaces_the_pending_state() {
	let store = MemoryStateStore::default();
	let scope = scope("browser-1");
	let first = store.issue(&scope).await.expect("Issuing state should succeed.");
	let second = store.issue(&scope).await.expect("Reissuing state should succeed.");

	assert_ne!(first.state_token, second.state_token);
	assert!(!store.consume(&scope, &first.state_token).await.expect("Consume should succeed."));
	assert!(store.consume(&scope, &second.state_token).await.expect("Consume should succeed."));
}

#[tokio::test]
async fn purge_reclaims_only_expired_states() {
	let store = MemoryStateStore::with_ttl(Duration::minutes(10));
	let now = macros::datetime!(2025-11-10 12:00 UTC);

	store
		.issue_at(&scope("old"), now - Duration::minutes(30))
		.await
		.expect("Issue should succeed.");
	store.issue_at(&scope("fresh"), now).await.expect("Issue should succeed.");

	assert_eq!(store.purge_expired(now).await.expect("Purge should succeed."), 1);
	assert_eq!(store.len(), 1);
}
