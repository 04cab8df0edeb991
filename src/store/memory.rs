//! Thread-safe in-memory [`CredentialStore`] implementation for ephemeral sessions and tests.

// self
use crate::{
	_prelude::*,
	credential::{CredentialPair, CredentialSnapshot, SessionEpoch, TokenSecret},
	store::{CredentialStore, RotateOutcome, StoreFuture},
};

/// Thread-safe storage backend that keeps the session in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<CredentialSnapshot>>);
impl MemoryStore {
	/// Creates a store that already holds `pair` in its first session epoch.
	pub fn with_pair(pair: CredentialPair) -> Self {
		let store = Self::default();

		store.0.write().write_pair(pair);

		store
	}

	/// Returns the current snapshot without going through the async contract.
	pub fn snapshot(&self) -> CredentialSnapshot {
		self.0.read().clone()
	}

	fn mutate<'a, T>(
		&'a self,
		f: impl 'a + Send + FnOnce(&mut CredentialSnapshot) -> T,
	) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
	{
		let inner = self.0.clone();

		Box::pin(async move { Ok(f(&mut inner.write())) })
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, CredentialSnapshot> {
		let inner = self.0.clone();

		Box::pin(async move { Ok(inner.read().clone()) })
	}

	fn set_access(&self, token: TokenSecret) -> StoreFuture<'_, ()> {
		self.mutate(|snapshot| snapshot.write_access(token))
	}

	fn set_refresh(&self, token: TokenSecret) -> StoreFuture<'_, ()> {
		self.mutate(|snapshot| snapshot.write_refresh(token))
	}

	fn replace(&self, pair: CredentialPair) -> StoreFuture<'_, SessionEpoch> {
		self.mutate(|snapshot| snapshot.write_pair(pair))
	}

	fn rotate(
		&self,
		expected: SessionEpoch,
		access: TokenSecret,
		refresh: Option<TokenSecret>,
	) -> StoreFuture<'_, RotateOutcome> {
		self.mutate(move |snapshot| snapshot.write_rotation(expected, access, refresh))
	}

	fn clear(&self) -> StoreFuture<'_, SessionEpoch> {
		self.mutate(CredentialSnapshot::wipe)
	}

	fn clear_if_current(&self, expected: SessionEpoch) -> StoreFuture<'_, bool> {
		self.mutate(move |snapshot| snapshot.wipe_if_current(expected))
	}
}
