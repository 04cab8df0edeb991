//! File-backed [`CredentialStore`] that keeps the session across process restarts.

// std
use std::{
	fs::{self, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	credential::{CredentialPair, CredentialSnapshot, SessionEpoch, TokenSecret},
	store::{CredentialStore, RotateOutcome, StoreError, StoreFuture},
};

/// Persists the session snapshot to a JSON file after each mutation.
///
/// Writes go to a sibling `*.tmp` file that is synced and renamed over the target, so a crash
/// leaves either the previous or the next snapshot on disk. On Unix the file is created with
/// `0o600` permissions.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<CredentialSnapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<CredentialSnapshot, StoreError> {
		if !path.exists() {
			return Ok(CredentialSnapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(CredentialSnapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, snapshot: &CredentialSnapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut options = OpenOptions::new();

			options.write(true).create(true).truncate(true);

			#[cfg(unix)]
			{
				use std::os::unix::fs::OpenOptionsExt;

				options.mode(0o600);
			}

			let mut file = options.open(&tmp_path).map_err(|e| StoreError::Backend {
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

	/// Applies `f` to a copy of the snapshot, persists it, then publishes it.
	///
	/// The in-memory snapshot only changes once the file write succeeded.
	fn mutate<T>(
		&self,
		f: impl FnOnce(&mut CredentialSnapshot) -> T,
	) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();
		let out = f(&mut next);

		if next != *guard {
			self.persist(&next)?;

			*guard = next;
		}

		Ok(out)
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, CredentialSnapshot> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn set_access(&self, token: TokenSecret) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.write_access(token)) })
	}

	fn set_refresh(&self, token: TokenSecret) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.write_refresh(token)) })
	}

	fn replace(&self, pair: CredentialPair) -> StoreFuture<'_, SessionEpoch> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.write_pair(pair)) })
	}

	fn rotate(
		&self,
		expected: SessionEpoch,
		access: TokenSecret,
		refresh: Option<TokenSecret>,
	) -> StoreFuture<'_, RotateOutcome> {
		Box::pin(async move {
			self.mutate(|snapshot| snapshot.write_rotation(expected, access, refresh))
		})
	}

	fn clear(&self) -> StoreFuture<'_, SessionEpoch> {
		Box::pin(async move { self.mutate(CredentialSnapshot::wipe) })
	}

	fn clear_if_current(&self, expected: SessionEpoch) -> StoreFuture<'_, bool> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.wipe_if_current(expected)) })
	}
}
