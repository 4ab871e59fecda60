//! File-backed [`TokenVault`] that snapshots `linked_credentials` as JSON after each mutation.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Identity, LinkedCredential, ProviderId},
	store::{CredentialKey, StoreError, StoreFuture, TokenVault},
};

type Snapshot = BTreeMap<CredentialKey, LinkedCredential>;

/// Persists linked credentials to a JSON file, replacing it atomically on every write.
#[derive(Clone, Debug)]
pub struct FileVault {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileVault {
	/// Opens (or creates) a vault at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Path of the backing snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let rows: Vec<&LinkedCredential> = contents.values().collect();
		let serialized =
			serde_json::to_vec_pretty(&rows).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize vault snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenVault for FileVault {
	fn upsert(&self, credential: LinkedCredential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let key = CredentialKey::of(&credential);
			let previous = guard.insert(key.clone(), credential);

			if let Err(e) = self.persist_locked(&guard) {
				match previous {
					Some(prior) => guard.insert(key, prior),
					None => guard.remove(&key),
				};

				return Err(e);
			}

			Ok(())
		})
	}

	fn get<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		Box::pin(async move {
			let key = CredentialKey::new(identity, provider);

			Ok(self.inner.read().get(&key).cloned())
		})
	}

	fn delete<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		Box::pin(async move {
			let key = CredentialKey::new(identity, provider);
			let mut guard = self.inner.write();
			let Some(removed) = guard.remove(&key) else {
				return Ok(None);
			};

			if let Err(e) = self.persist_locked(&guard) {
				guard.insert(key, removed);

				return Err(e);
			}

			Ok(Some(removed))
		})
	}

	fn list<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Vec<LinkedCredential>> {
		Box::pin(async move {
			Ok(self
				.inner
				.read()
				.values()
				.filter(|credential| &credential.identity == identity)
				.cloned()
				.collect())
		})
	}
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	if !path.exists() {
		return Ok(Snapshot::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(Snapshot::new());
	}

	let rows: Vec<LinkedCredential> =
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

	Ok(rows.into_iter().map(|credential| (CredentialKey::of(&credential), credential)).collect())
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create vault directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}
