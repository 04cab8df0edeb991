//! Single-flight refresh coordination.
//!
//! Every request whose failure classifies as an expired access credential calls
//! [`RefreshCoordinator::request_retry_decision`]. The first caller of a round becomes its
//! leader and performs exactly one [`RefreshExchange`] call; everyone arriving while the round
//! is in flight queues as a waiter and receives the same [`RetryDecision`] once the leader
//! resolves the round. Successful exchanges are written back with an epoch-checked
//! [`CredentialStore::rotate`], failed ones clear the session, so a sign-out racing a refresh
//! can never be undone by a late write.

pub mod exchange;
pub mod oauth;

mod metrics;

pub use exchange::*;
pub use metrics::RefreshMetrics;
pub use oauth::*;

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	credential::SessionEpoch,
	error::RefreshError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, RoundReport},
	store::{CredentialStore, RotateOutcome, StoreError},
};

/// Outcome delivered to every waiter of a refresh round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryDecision {
	/// The round stored fresh credentials; replay the request once.
	Retry,
	/// The round failed or was invalidated; surface the original failure.
	DoNotRetry,
}
impl RetryDecision {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryDecision::Retry => "retry",
			RetryDecision::DoNotRetry => "do_not_retry",
		}
	}
}
impl Display for RetryDecision {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Coalesces concurrent refresh demands into one exchange per round.
pub struct RefreshCoordinator {
	store: Arc<dyn CredentialStore>,
	exchange: Arc<dyn RefreshExchange>,
	metrics: Arc<RefreshMetrics>,
	state: Mutex<RefreshState>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator over `store` that refreshes through `exchange`.
	pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn RefreshExchange>) -> Self {
		Self { store, exchange, metrics: Default::default(), state: Default::default() }
	}

	/// Shared counters describing past rounds.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns true while a round is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight
	}

	/// Number of callers (leader included) waiting on the current round.
	pub fn pending_waiters(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Joins the current refresh round, starting one if none is in flight, and waits for its
	/// decision.
	///
	/// If the leader's future is dropped before the round completes, the round resolves with
	/// [`RetryDecision::DoNotRetry`] so no follower is left waiting.
	pub async fn request_retry_decision(&self) -> RetryDecision {
		let (receiver, role) = self.enqueue();

		if let Role::Leader(round) = role {
			let span = FlowSpan::new(FlowKind::Refresh, "request_retry_decision");
			let guard = RoundGuard { coordinator: self, round, armed: true };

			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

			let outcome = span.instrument(self.run_round()).await;

			guard.complete(outcome);
		}

		receiver.await.unwrap_or(RetryDecision::DoNotRetry)
	}

	/// Resolves every queued waiter with [`RetryDecision::DoNotRetry`] and returns to idle.
	///
	/// The running leader (if any) finishes its exchange, but its resolution becomes a no-op.
	/// Returns the number of waiters released.
	pub fn invalidate(&self) -> usize {
		let mut state = self.state.lock();

		if !state.in_flight {
			return 0;
		}

		state.drain(RetryDecision::DoNotRetry)
	}

	fn enqueue(&self) -> (oneshot::Receiver<RetryDecision>, Role) {
		let (sender, receiver) = oneshot::channel();
		let mut state = self.state.lock();

		state.waiters.push(PendingWaiter(sender));

		if state.in_flight {
			self.metrics.record_follower();

			(receiver, Role::Follower)
		} else {
			state.in_flight = true;
			state.round = state.round.wrapping_add(1);

			(receiver, Role::Leader(state.round))
		}
	}

	async fn run_round(&self) -> RoundOutcome {
		self.metrics.record_round();

		let snapshot = match self.store.load().await {
			Ok(snapshot) => snapshot,
			Err(err) =>
				return RoundOutcome::Failed {
					error: err.into(),
					fingerprint: None,
					clear_error: None,
				},
		};
		let epoch = snapshot.epoch;
		let Some(refresh) = snapshot.pair.refresh else {
			let clear_error = self.clear_session(epoch).await;

			return RoundOutcome::Failed {
				error: RefreshError::MissingRefreshToken,
				fingerprint: None,
				clear_error,
			};
		};
		let fingerprint = refresh.fingerprint();

		self.metrics.record_exchange();

		match self.exchange.exchange(&refresh).await {
			Ok(refreshed) =>
				match self.store.rotate(epoch, refreshed.access, refreshed.refresh).await {
					Ok(RotateOutcome::Updated) => RoundOutcome::Refreshed { fingerprint },
					Ok(RotateOutcome::SessionChanged) => RoundOutcome::SessionChanged { fingerprint },
					Err(err) => RoundOutcome::Failed {
						error: err.into(),
						fingerprint: Some(fingerprint),
						clear_error: None,
					},
				},
			Err(error) => {
				// The refresh credential is spent or rejected; only a new sign-in recovers.
				let clear_error = self.clear_session(epoch).await;

				RoundOutcome::Failed { error, fingerprint: Some(fingerprint), clear_error }
			},
		}
	}

	/// Clears the session loaded at `epoch`, returning the store error if the clear failed.
	async fn clear_session(&self, epoch: SessionEpoch) -> Option<StoreError> {
		match self.store.clear_if_current(epoch).await {
			Ok(_) => None,
			Err(err) => {
				self.metrics.record_clear_failure();

				Some(err)
			},
		}
	}

	fn finish(&self, round: u64, outcome: RoundOutcome) {
		let decision = outcome.decision();
		let waiters = {
			let mut state = self.state.lock();

			if state.in_flight && state.round == round { state.drain(decision) } else { 0 }
		};

		match decision {
			RetryDecision::Retry => {
				self.metrics.record_success();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);
			},
			RetryDecision::DoNotRetry => {
				self.metrics.record_failure();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
			},
		}

		obs::record_retry_decisions(decision, waiters);
		obs::trace_round(&RoundReport {
			round,
			waiters,
			decision,
			refresh_fingerprint: outcome.fingerprint(),
			failure: outcome.failure(),
		});
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("in_flight", &state.in_flight)
			.field("round", &state.round)
			.field("waiters", &state.waiters.len())
			.finish()
	}
}

#[derive(Default)]
struct RefreshState {
	in_flight: bool,
	round: u64,
	waiters: Vec<PendingWaiter>,
}
impl RefreshState {
	/// Resolves and clears every waiter, then leaves the round.
	fn drain(&mut self, decision: RetryDecision) -> usize {
		let waiters = mem::take(&mut self.waiters);
		let count = waiters.len();

		for waiter in waiters {
			waiter.resolve(decision);
		}

		self.in_flight = false;

		count
	}
}

struct PendingWaiter(oneshot::Sender<RetryDecision>);
impl PendingWaiter {
	fn resolve(self, decision: RetryDecision) {
		// A dropped receiver means the caller gave up; nothing to deliver.
		let _ = self.0.send(decision);
	}
}

enum Role {
	Leader(u64),
	Follower,
}

enum RoundOutcome {
	Refreshed { fingerprint: String },
	SessionChanged { fingerprint: String },
	Failed { error: RefreshError, fingerprint: Option<String>, clear_error: Option<StoreError> },
	Abandoned,
}
impl RoundOutcome {
	fn decision(&self) -> RetryDecision {
		match self {
			Self::Refreshed { .. } => RetryDecision::Retry,
			_ => RetryDecision::DoNotRetry,
		}
	}

	fn fingerprint(&self) -> Option<&str> {
		match self {
			Self::Refreshed { fingerprint } | Self::SessionChanged { fingerprint } =>
				Some(fingerprint),
			Self::Failed { fingerprint, .. } => fingerprint.as_deref(),
			Self::Abandoned => None,
		}
	}

	fn failure(&self) -> Option<String> {
		match self {
			Self::Refreshed { .. } => None,
			Self::SessionChanged { .. } => Some("session changed during refresh".into()),
			Self::Failed { error, clear_error: None, .. } => Some(error.to_string()),
			Self::Failed { error, clear_error: Some(clear_error), .. } =>
				Some(format!("{error} Session could not be cleared: {clear_error}")),
			Self::Abandoned => Some("leader dropped before the round completed".into()),
		}
	}
}

/// Resolves the round with [`RetryDecision::DoNotRetry`] if the leader never completes it.
struct RoundGuard<'a> {
	coordinator: &'a RefreshCoordinator,
	round: u64,
	armed: bool,
}
impl RoundGuard<'_> {
	fn complete(mut self, outcome: RoundOutcome) {
		self.armed = false;
		self.coordinator.finish(self.round, outcome);
	}
}
impl Drop for RoundGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.coordinator.finish(self.round, RoundOutcome::Abandoned);
		}
	}
}
