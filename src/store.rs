//! Token Vault contract and built-in vault implementations for linked credentials.

pub mod file;
pub mod memory;

pub use file::FileVault;
pub use memory::MemoryVault;

// self
use crate::{
	_prelude::*,
	auth::{Identity, LinkedCredential, ProviderId},
};

/// Boxed future returned by every storage contract in the crate.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable store of per-identity, per-provider credentials.
///
/// Implementations must apply each call atomically per [`CredentialKey`] so concurrent
/// writers to the same key resolve as last-writer-wins.
pub trait TokenVault
where
	Self: Send + Sync,
{
	/// Persists the credential, replacing any prior record for the same key wholesale.
	fn upsert(&self, credential: LinkedCredential) -> StoreFuture<'_, ()>;

	/// Fetches the credential for the key, if present.
	fn get<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>>;

	/// Removes the credential for the key, returning the deleted record.
	fn delete<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>>;

	/// Lists every credential linked to the identity, ordered by provider.
	fn list<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Vec<LinkedCredential>>;
}

/// Error type produced by the storage contracts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying a linked credential (`linked_credentials` primary key).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
	/// Owning identity.
	pub identity: Identity,
	/// Issuing provider.
	pub provider: ProviderId,
}
impl CredentialKey {
	/// Builds a key for the identity/provider pair.
	pub fn new(identity: &Identity, provider: ProviderId) -> Self {
		Self { identity: identity.clone(), provider }
	}

	/// Key under which `credential` is stored.
	pub fn of(credential: &LinkedCredential) -> Self {
		Self::new(&credential.identity, credential.provider)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_keys_use_normalized_identities() {
		let upper = Identity::new("A@X.com").expect("Identity fixture should be valid.");
		let lower = Identity::new("a@x.com").expect("Identity fixture should be valid.");

		assert_eq!(
			CredentialKey::new(&upper, ProviderId::Twitter),
			CredentialKey::new(&lower, ProviderId::Twitter)
		);
		assert_ne!(
			CredentialKey::new(&lower, ProviderId::Twitter),
			CredentialKey::new(&lower, ProviderId::Reddit)
		);
	}

	#[test]
	fn store_error_can_be_serialized() {
		let payload = serde_json::to_string(&StoreError::Backend { message: "down".into() })
			.expect("StoreError should serialize to JSON.");
		let round_trip: StoreError =
			serde_json::from_str(&payload).expect("Serialized error should deserialize.");

		assert_eq!(round_trip, StoreError::Backend { message: "down".into() });
	}
}
