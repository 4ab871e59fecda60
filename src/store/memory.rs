//! Thread-safe in-memory [`TokenVault`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Identity, LinkedCredential, ProviderId},
	store::{CredentialKey, StoreFuture, TokenVault},
};

type VaultMap = Arc<RwLock<BTreeMap<CredentialKey, LinkedCredential>>>;

/// Thread-safe vault that keeps credentials in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryVault(VaultMap);
impl MemoryVault {
	/// Number of stored credentials across all identities.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when no credential is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn upsert_now(map: VaultMap, credential: LinkedCredential) {
		map.write().insert(CredentialKey::of(&credential), credential);
	}

	fn list_now(map: VaultMap, identity: Identity) -> Vec<LinkedCredential> {
		map.read()
			.iter()
			.filter(|(key, _)| key.identity == identity)
			.map(|(_, credential)| credential.clone())
			.collect()
	}
}
impl TokenVault for MemoryVault {
	fn upsert(&self, credential: LinkedCredential) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			Self::upsert_now(map, credential);

			Ok(())
		})
	}

	fn get<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		let key = CredentialKey::new(identity, provider);

		Box::pin(async move { Ok(self.0.read().get(&key).cloned()) })
	}

	fn delete<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		let key = CredentialKey::new(identity, provider);

		Box::pin(async move { Ok(self.0.write().remove(&key)) })
	}

	fn list<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Vec<LinkedCredential>> {
		let map = self.0.clone();
		let identity = identity.to_owned();

		Box::pin(async move { Ok(Self::list_now(map, identity)) })
	}
}
