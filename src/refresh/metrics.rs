// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh rounds.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	rounds: AtomicU64,
	exchanges: AtomicU64,
	followers: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	clear_failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of rounds started by a leader.
	pub fn rounds(&self) -> u64 {
		self.rounds.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh network calls performed.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that joined a round someone else was leading.
	pub fn followers(&self) -> u64 {
		self.followers.load(Ordering::Relaxed)
	}

	/// Returns the number of rounds that resolved with a retry.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of rounds that resolved without a retry.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of failed rounds whose store clear itself failed.
	pub fn clear_failures(&self) -> u64 {
		self.clear_failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_round(&self) {
		self.rounds.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_follower(&self) {
		self.followers.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_clear_failure(&self) {
		self.clear_failure.fetch_add(1, Ordering::Relaxed);
	}
}
