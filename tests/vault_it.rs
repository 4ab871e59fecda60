#![cfg(feature = "test")]

// std
use std::{env, process};
// crates.io
use time::macros;
// self
use oauth2_linker::{
	_preludet::*,
	auth::{Identity, LinkedCredential, ProviderId, TokenSet},
	store::{FileVault, MemoryVault, TokenVault},
};

fn identity(raw: &str) -> Identity {
	Identity::new(raw).expect("Identity fixture should be valid.")
}

fn credential(owner: &Identity, access: &str, refresh: Option<&str>) -> LinkedCredential {
	let issued = macros::datetime!(2025-11-10 12:00 UTC);
	let mut builder =
		TokenSet::builder().access_token(access).issued_at(issued).expires_in(Duration::days(1));

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	LinkedCredential::new(
		owner.clone(),
		ProviderId::TikTok,
		builder.build().expect("Token set fixture should build successfully."),
		Some("open-id-1".into()),
		issued,
	)
}

fn temp_vault_path(tag: &str) -> std::path::PathBuf {
	env::temp_dir().join(format!(
		"oauth2_linker_vault_it_{tag}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

#[tokio::test]
async fn relinking_replaces_the_record_wholesale() {
	let vault = MemoryVault::default();
	let owner = identity("u@x.com");

	vault
		.upsert(credential(&owner, "act.old", Some("rft.old")))
		.await
		.expect("First upsert should succeed.");
	vault.upsert(credential(&owner, "act.new", None)).await.expect("Second upsert should succeed.");

	let stored = vault
		.get(&owner, ProviderId::TikTok)
		.await
		.expect("Lookup should succeed.")
		.expect("Credential should be present after relinking.");

	assert_eq!(stored.tokens.access_token.expose(), "act.new");
	assert!(stored.tokens.refresh_token.is_none(), "Stale refresh token must not survive.");
	assert_eq!(vault.len(), 1);
}

#[tokio::test]
async fn credentials_are_isolated_per_identity() {
	let vault = MemoryVault::default();
	let alice = identity("alice@x.com");
	let bob = identity("bob@x.com");

	vault.upsert(credential(&alice, "act.a", None)).await.expect("Upsert should succeed.");
	vault.upsert(credential(&bob, "act.b", None)).await.expect("Upsert should succeed.");

	let listed = vault.list(&alice).await.expect("Listing should succeed.");

	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].tokens.access_token.expose(), "act.a");

	let removed = vault.delete(&alice, ProviderId::TikTok).await.expect("Delete should succeed.");

	assert!(removed.is_some());
	assert!(vault.get(&alice, ProviderId::TikTok).await.expect("Lookup should succeed.").is_none());
	assert!(vault.get(&bob, ProviderId::TikTok).await.expect("Lookup should succeed.").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_to_one_key_leave_a_single_complete_record() {
	let vault = Arc::new(MemoryVault::default());
	let owner = identity("u@x.com");
	let mut handles = Vec::new();

	for i in 0..16 {
		let vault = vault.clone();
		let record = credential(&owner, &format!("act.{i}"), Some(&format!("rft.{i}")));

		handles.push(tokio::spawn(async move { vault.upsert(record).await }));
	}
	for handle in handles {
		handle.await.expect("Upsert task should not panic.").expect("Upsert should succeed.");
	}

	let stored = vault
		.get(&owner, ProviderId::TikTok)
		.await
		.expect("Lookup should succeed.")
		.expect("One credential should remain.");
	let suffix = stored
		.tokens
		.access_token
		.expose()
		.strip_prefix("act.")
		.expect("Access token should keep its fixture prefix.")
		.to_owned();

	// Both tokens must come from the same writer.
	assert_eq!(
		stored.tokens.refresh_token.as_ref().map(|token| token.expose().to_owned()),
		Some(format!("rft.{suffix}"))
	);
	assert_eq!(vault.len(), 1);
}

#[tokio::test]
async fn file_vault_survives_reopening() {
	let path = temp_vault_path("reopen");
	let owner = identity("u@x.com");

	{
		let vault = FileVault::open(&path).expect("File vault should open.");

		vault
			.upsert(credential(&owner, "act.persisted", Some("rft.persisted")))
			.await
			.expect("Upsert should persist.");
	}

	let reopened = FileVault::open(&path).expect("File vault should reopen.");
	let stored = reopened
		.get(&owner, ProviderId::TikTok)
		.await
		.expect("Lookup should succeed.")
		.expect("Credential should be reloaded from disk.");

	assert_eq!(stored.tokens.access_token.expose(), "act.persisted");
	assert_eq!(stored.subject.as_deref(), Some("open-id-1"));

	reopened.delete(&owner, ProviderId::TikTok).await.expect("Delete should persist.");

	let emptied = FileVault::open(&path).expect("File vault should reopen after delete.");

	assert!(emptied.list(&owner).await.expect("Listing should succeed.").is_empty());

	let _ = std::fs::remove_file(&path);
}
