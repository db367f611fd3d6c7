use crate::delivery::Delivery;
use crate::shipper::ShipperCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle of the timer-driven dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
	/// Constructed, timer not armed yet
	Idle,
	/// Timer armed, nothing in flight from the timer path
	Scheduled,
	/// A timer-initiated delivery is in flight
	Draining,
	/// Terminal, no more automatic drains
	Stopped,
}

/// Repeating timer that drains the buffer once consent is granted.
pub(crate) struct DispatchLoop<D: Delivery> {
	core: Arc<ShipperCore<D>>,
	start: Instant,
	period: Duration,
	cancel_token: CancellationToken,
}

impl<D: Delivery> DispatchLoop<D> {
	/// The first tick fires one full `period` after `start`.
	pub(crate) const fn new(core: Arc<ShipperCore<D>>, start: Instant, period: Duration, cancel_token: CancellationToken) -> Self {
		Self {
			core,
			start,
			period,
			cancel_token,
		}
	}

	pub(crate) async fn run(self) {
		let mut ticker = interval_at(self.start + self.period, self.period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		self.core.transition(DispatchState::Idle, DispatchState::Scheduled);
		info!("Dispatch loop started with interval: {:?}", self.period);

		loop {
			tokio::select! {
				biased;

				() = self.cancel_token.cancelled() => {
					break;
				}
				_ = ticker.tick() => {
					self.handle_tick();
				}
			}
		}

		self.core.set_dispatch_state(DispatchState::Stopped);
		info!("Dispatch loop stopped");
	}

	/// Starts at most one delivery. A tick that finds a delivery in flight
	/// does nothing and waits for the next one.
	fn handle_tick(&self) {
		let Ok(permit) = Arc::clone(&self.core.in_flight).try_lock_owned() else {
			debug!("Delivery still in flight, skipping tick");
			return;
		};

		let Some(batch) = self.core.take_batch() else {
			return;
		};

		self.core.transition(DispatchState::Scheduled, DispatchState::Draining);

		let core = Arc::clone(&self.core);
		tokio::spawn(async move {
			core.deliver(batch).await;
			core.finish_draining();
			drop(permit);
		});
	}
}
