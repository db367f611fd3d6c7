use crate::buffer::EventBuffer;
use crate::config::ShipperOptions;
use crate::consent::{ConsentGate, ConsentState};
use crate::delivery::{classify, encode_ndjson, Delivery, DeliveryRequest, HttpDelivery};
use crate::dispatch::{DispatchLoop, DispatchState};
use crate::error::Result;
use crate::event::{Event, EventContext};
use crate::outcome::{records_for_batch, Outcome, OutcomeReceiver, OutcomeStream};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Value of `source` in every outcome record this shipper emits.
pub const SHIPPER_NAME: &str = "elastic_v3_http";

/// A pluggable delivery backend for telemetry events.
#[async_trait]
pub trait Shipper: Send + Sync {
	/// Enqueues events. Never fails and never sends immediately.
	fn report_events(&self, events: Vec<Event>);

	/// Records the opt-in decision.
	fn opt_in(&self, granted: bool);

	/// Merges a partial context into the snapshot used for outbound headers.
	fn extend_context(&self, context: EventContext);

	/// Subscribes to outcome records emitted from now on.
	fn telemetry_counter(&self) -> OutcomeReceiver;

	/// Sends what is buffered without waiting for the timer.
	async fn flush(&self);

	/// Stops automatic sending for good after one last best-effort send.
	async fn shutdown(&self);
}

struct ShipperState {
	buffer: EventBuffer,
	consent: ConsentGate,
	context: EventContext,
	stopped: bool,
}

impl ShipperState {
	/// Drains the buffer in one step, but only when sending is allowed.
	fn take_batch(&mut self) -> Option<Batch> {
		if !self.consent.is_granted() || self.buffer.is_empty() {
			return None;
		}

		Some(Batch {
			events: self.buffer.drain_all(),
			cluster_uuid: self.context.cluster_uuid_or_unknown().to_string(),
			license_id: self.context.license_id.clone(),
		})
	}
}

/// Drained events plus the context snapshot taken with them.
pub(crate) struct Batch {
	events: Vec<Event>,
	cluster_uuid: String,
	license_id: Option<String>,
}

/// State shared between the public handle, the dispatch loop and delivery tasks.
pub(crate) struct ShipperCore<D: Delivery> {
	state: Mutex<ShipperState>,
	/// Held for the whole duration of a delivery; at most one at a time
	pub(crate) in_flight: Arc<tokio::sync::Mutex<()>>,
	delivery: D,
	outcomes: OutcomeStream,
	options: ShipperOptions,
	dispatch_tx: watch::Sender<DispatchState>,
}

impl<D: Delivery> ShipperCore<D> {
	fn lock_state(&self) -> MutexGuard<'_, ShipperState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn is_stopped(&self) -> bool {
		self.lock_state().stopped
	}

	pub(crate) fn take_batch(&self) -> Option<Batch> {
		let mut state = self.lock_state();
		if state.stopped {
			return None;
		}
		state.take_batch()
	}

	/// Performs one delivery attempt and reports its outcome. Never retries.
	pub(crate) async fn deliver(&self, batch: Batch) {
		let Batch { events, cluster_uuid, license_id } = batch;

		let request = DeliveryRequest {
			url: self.options.url(),
			headers: self.options.headers(&cluster_uuid, license_id.as_deref()),
			body: encode_ndjson(&events),
			debug: self.options.debug,
		};

		debug!(count = events.len(), url = %request.url, "Sending telemetry batch");
		let result = self.delivery.send(request).await;
		let (outcome, code) = classify(&result);

		match outcome {
			Outcome::Succeeded => debug!(count = events.len(), code = %code, "Telemetry batch delivered"),
			Outcome::Failed => warn!(count = events.len(), code = %code, "Telemetry batch delivery failed"),
		}

		for record in records_for_batch(SHIPPER_NAME, &events, outcome, &code) {
			self.outcomes.emit(record);
		}
	}

	pub(crate) fn set_dispatch_state(&self, state: DispatchState) {
		self.dispatch_tx.send_replace(state);
	}

	/// Moves the dispatch state from `from` to `to`, unless something else
	/// (usually shutdown) changed it first.
	pub(crate) fn transition(&self, from: DispatchState, to: DispatchState) -> bool {
		self.dispatch_tx.send_if_modified(|current| {
			if *current == from {
				*current = to;
				true
			} else {
				false
			}
		})
	}

	pub(crate) fn finish_draining(&self) {
		self.transition(DispatchState::Draining, DispatchState::Scheduled);
	}
}

/// Buffers events and ships them as ndjson over HTTP.
///
/// Must be created inside a Tokio runtime: construction arms the dispatch
/// timer on a background task.
///
/// ```rust,no_run
/// use event_shipper::{Event, HttpShipper, Shipper, ShipperOptions};
///
/// # async fn example() -> event_shipper::Result<()> {
/// let shipper = HttpShipper::new(ShipperOptions::new("my-channel", "1.2.3"))?;
/// let mut outcomes = shipper.telemetry_counter();
///
/// shipper.report_events(vec![Event::new("page_view").with_property("page", "/home")]);
/// shipper.opt_in(true);
/// shipper.flush().await;
///
/// if let Ok(record) = outcomes.try_recv() {
/// 	println!("{} {} x{}", record.event_type, record.code, record.count);
/// }
/// shipper.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct HttpShipper<D: Delivery = HttpDelivery> {
	core: Arc<ShipperCore<D>>,
	cancel_token: CancellationToken,
	task_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HttpShipper<HttpDelivery> {
	/// Creates a shipper backed by `reqwest`.
	///
	/// # Errors
	///
	/// Invalid options, or an HTTP client that cannot be built.
	pub fn new(options: ShipperOptions) -> Result<Self> {
		options.validate()?;
		let delivery = HttpDelivery::new(options.request_timeout)?;
		Self::with_delivery(options, delivery)
	}
}

impl<D: Delivery> HttpShipper<D> {
	/// Creates a shipper with a custom delivery transport.
	///
	/// # Errors
	///
	/// [`crate::ShipperError::InvalidOptions`] when the options do not validate.
	pub fn with_delivery(options: ShipperOptions, delivery: D) -> Result<Self> {
		options.validate()?;

		let period = options.flush_interval;
		let (dispatch_tx, _) = watch::channel(DispatchState::Idle);

		let core = Arc::new(ShipperCore {
			state: Mutex::new(ShipperState {
				buffer: EventBuffer::new(),
				consent: ConsentGate::new(),
				context: EventContext::default(),
				stopped: false,
			}),
			in_flight: Arc::new(tokio::sync::Mutex::new(())),
			delivery,
			outcomes: OutcomeStream::new(options.outcome_capacity),
			options,
			dispatch_tx,
		});

		let cancel_token = CancellationToken::new();
		let dispatch = DispatchLoop::new(Arc::clone(&core), Instant::now(), period, cancel_token.clone());
		let task_handle = tokio::spawn(dispatch.run());

		Ok(Self {
			core,
			cancel_token,
			task_handle: tokio::sync::Mutex::new(Some(task_handle)),
		})
	}

	#[must_use]
	pub fn consent_state(&self) -> ConsentState {
		self.core.lock_state().consent.state()
	}

	#[must_use]
	pub fn dispatch_state(&self) -> DispatchState {
		*self.core.dispatch_tx.borrow()
	}

	#[must_use]
	pub fn subscribe_dispatch_state(&self) -> watch::Receiver<DispatchState> {
		self.core.dispatch_tx.subscribe()
	}

	/// Number of events waiting in the buffer.
	#[must_use]
	pub fn pending_events(&self) -> usize {
		self.core.lock_state().buffer.len()
	}

	/// Snapshot of the context consulted for outbound headers.
	#[must_use]
	pub fn context(&self) -> EventContext {
		self.core.lock_state().context.clone()
	}

	#[must_use]
	pub fn options(&self) -> &ShipperOptions {
		&self.core.options
	}

	/// Spawns a delivery that first waits for the in-flight slot. The task
	/// keeps running even if the caller stops waiting for it.
	fn spawn_delivery(&self, batch: Batch) -> JoinHandle<()> {
		let core = Arc::clone(&self.core);
		tokio::spawn(async move {
			let permit = Arc::clone(&core.in_flight).lock_owned().await;
			core.deliver(batch).await;
			drop(permit);
		})
	}
}

#[async_trait]
impl<D: Delivery> Shipper for HttpShipper<D> {
	fn report_events(&self, events: Vec<Event>) {
		let mut state = self.core.lock_state();
		state.buffer.push(events);
	}

	fn opt_in(&self, granted: bool) {
		let previous = self.core.lock_state().consent.set(granted);
		debug!(?previous, granted, "Consent updated");
	}

	fn extend_context(&self, context: EventContext) {
		debug!(?context, "Received context");
		self.core.lock_state().context.merge(context);
	}

	fn telemetry_counter(&self) -> OutcomeReceiver {
		self.core.outcomes.subscribe()
	}

	async fn flush(&self) {
		if self.core.is_stopped() {
			return;
		}

		// Waiting here also waits for whatever delivery is in flight
		let permit = Arc::clone(&self.core.in_flight).lock_owned().await;
		let Some(batch) = self.core.take_batch() else {
			return;
		};

		let core = Arc::clone(&self.core);
		let handle = tokio::spawn(async move {
			core.deliver(batch).await;
			drop(permit);
		});

		if let Err(e) = handle.await {
			warn!("Flush delivery task failed: {}", e);
		}
	}

	async fn shutdown(&self) {
		let batch = {
			let mut state = self.core.lock_state();
			if state.stopped {
				return;
			}
			state.stopped = true;
			state.take_batch()
		};

		info!("Shutting down shipper");
		self.cancel_token.cancel();
		self.core.set_dispatch_state(DispatchState::Stopped);

		let final_send = batch.map(|batch| self.spawn_delivery(batch));

		if let Some(handle) = self.task_handle.lock().await.take() {
			if let Err(e) = handle.await {
				warn!("Dispatch loop task failed: {}", e);
			}
		}

		if let Some(handle) = final_send {
			if let Err(e) = handle.await {
				warn!("Final delivery task failed: {}", e);
			}
		}

		info!("Shipper shut down complete");
	}
}

impl<D: Delivery> Drop for HttpShipper<D> {
	fn drop(&mut self) {
		self.cancel_token.cancel();
	}
}
