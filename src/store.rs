//! Storage contracts and built-in store implementations for session credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	credential::{CredentialPair, CredentialSnapshot, SessionEpoch, TokenSecret},
};

/// Boxed future returned by every [`CredentialStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for the session's access/refresh credentials.
///
/// Every operation must be atomic with respect to the whole [`CredentialSnapshot`]: readers
/// observe either the pair before a write or the pair after it, never a mix of both.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the pair and its epoch in one atomic step.
	fn load(&self) -> StoreFuture<'_, CredentialSnapshot>;

	/// Returns the current access credential, if any.
	fn access(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move { Ok(self.load().await?.pair.access) })
	}

	/// Returns the current refresh credential, if any.
	fn refresh(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move { Ok(self.load().await?.pair.refresh) })
	}

	/// Overwrites the access credential without changing the session epoch.
	fn set_access(&self, token: TokenSecret) -> StoreFuture<'_, ()>;

	/// Overwrites the refresh credential without changing the session epoch.
	fn set_refresh(&self, token: TokenSecret) -> StoreFuture<'_, ()>;

	/// Installs a freshly issued pair and starts a new session epoch.
	fn replace(&self, pair: CredentialPair) -> StoreFuture<'_, SessionEpoch>;

	/// Writes refreshed credentials only if the store is still on `expected`.
	///
	/// A `None` refresh credential keeps the stored one.
	fn rotate(
		&self,
		expected: SessionEpoch,
		access: TokenSecret,
		refresh: Option<TokenSecret>,
	) -> StoreFuture<'_, RotateOutcome>;

	/// Removes both credentials and starts a new session epoch.
	fn clear(&self) -> StoreFuture<'_, SessionEpoch>;

	/// Clears the store only if it is still on `expected`; returns whether it did.
	fn clear_if_current(&self, expected: SessionEpoch) -> StoreFuture<'_, bool>;
}

/// Result of an epoch-checked credential write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotateOutcome {
	/// The epoch matched and both credentials were written.
	Updated,
	/// A sign-in or sign-out moved the store to another epoch; nothing was written.
	SessionChanged,
}

/// Error type produced by [`CredentialStore`] implementations.
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

impl CredentialSnapshot {
	pub(crate) fn write_access(&mut self, token: TokenSecret) {
		self.pair.access = Some(token);
		self.touch();
	}

	pub(crate) fn write_refresh(&mut self, token: TokenSecret) {
		self.pair.refresh = Some(token);
		self.touch();
	}

	pub(crate) fn write_pair(&mut self, pair: CredentialPair) -> SessionEpoch {
		self.pair = pair;
		self.epoch = self.epoch.next();
		self.touch();

		self.epoch
	}

	pub(crate) fn write_rotation(
		&mut self,
		expected: SessionEpoch,
		access: TokenSecret,
		refresh: Option<TokenSecret>,
	) -> RotateOutcome {
		if self.epoch != expected {
			return RotateOutcome::SessionChanged;
		}

		self.pair.access = Some(access);

		if let Some(refresh) = refresh {
			self.pair.refresh = Some(refresh);
		}

		self.touch();

		RotateOutcome::Updated
	}

	pub(crate) fn wipe(&mut self) -> SessionEpoch {
		self.pair = CredentialPair::default();
		self.epoch = self.epoch.next();
		self.touch();

		self.epoch
	}

	pub(crate) fn wipe_if_current(&mut self, expected: SessionEpoch) -> bool {
		if self.epoch != expected {
			return false;
		}

		self.wipe();

		true
	}

	fn touch(&mut self) {
		self.updated_at = Some(OffsetDateTime::now_utc());
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_pipeline_error_with_source() {
		let store_error = StoreError::Backend { message: "keychain locked".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("keychain locked"));

		let source = StdError::source(&error)
			.expect("Pipeline error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn rotation_respects_epoch() {
		let mut snapshot = CredentialSnapshot::default();
		let epoch = snapshot.write_pair(CredentialPair::new("access-1", "refresh-1"));

		assert_eq!(
			snapshot.write_rotation(epoch, TokenSecret::new("access-2"), None),
			RotateOutcome::Updated
		);
		assert_eq!(snapshot.pair.access.as_ref().map(TokenSecret::expose), Some("access-2"));
		assert_eq!(snapshot.pair.refresh.as_ref().map(TokenSecret::expose), Some("refresh-1"));

		let cleared = snapshot.wipe();

		assert_ne!(cleared, epoch);
		assert_eq!(
			snapshot.write_rotation(epoch, TokenSecret::new("access-3"), None),
			RotateOutcome::SessionChanged
		);
		assert!(snapshot.pair.is_empty());
	}

	#[test]
	fn conditional_wipe_skips_newer_sessions() {
		let mut snapshot = CredentialSnapshot::default();
		let old = snapshot.write_pair(CredentialPair::new("access-1", "refresh-1"));
		let new = snapshot.write_pair(CredentialPair::new("access-2", "refresh-2"));

		assert!(!snapshot.wipe_if_current(old));
		assert!(!snapshot.pair.is_empty());
		assert!(snapshot.wipe_if_current(new));
		assert!(snapshot.pair.is_empty());
	}

	#[test]
	fn rotate_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&RotateOutcome::SessionChanged)
			.expect("RotateOutcome should serialize to JSON.");

		assert_eq!(payload, "\"SessionChanged\"");
	}
}
