//! Outcome records and the multicast stream that carries them.
//!
//! One record is produced per distinct `event_type` in a delivered batch once
//! the attempt settles. The stream is hot: subscribers only see records
//! emitted after they subscribed.

use crate::error::{Result, ShipperError};
use crate::event::Event;
use async_broadcast::{broadcast, InactiveReceiver, Receiver, RecvError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
	Succeeded,
	Failed,
}

/// Per event type delivery result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
	/// Name of the shipper that made the attempt
	pub source: String,
	pub event_type: String,
	#[serde(rename = "type")]
	pub outcome: Outcome,
	/// HTTP status as a string, or a short transport error description
	pub code: String,
	/// Number of events of `event_type` in the batch
	pub count: usize,
}

/// Builds the records for one settled batch, in ascending `event_type` order.
pub(crate) fn records_for_batch(source: &str, events: &[Event], outcome: Outcome, code: &str) -> Vec<OutcomeRecord> {
	let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
	for event in events {
		*counts.entry(event.event_type.as_str()).or_default() += 1;
	}

	counts
		.into_iter()
		.map(|(event_type, count)| OutcomeRecord {
			source: source.to_string(),
			event_type: event_type.to_string(),
			outcome,
			code: code.to_string(),
			count,
		})
		.collect()
}

/// Sending half of the outcome stream, owned by the shipper.
pub struct OutcomeStream {
	sender: Sender<OutcomeRecord>,
	_keep_alive: InactiveReceiver<OutcomeRecord>, // Keep channel open without buffering
}

impl OutcomeStream {
	/// Creates a stream where each subscriber buffers at most `capacity`
	/// unread records; older ones are dropped on overflow.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (mut sender, receiver) = broadcast::<OutcomeRecord>(capacity.max(1));
		sender.set_await_active(false);
		sender.set_overflow(true);

		Self {
			sender,
			_keep_alive: receiver.deactivate(),
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> OutcomeReceiver {
		OutcomeReceiver(self.sender.new_receiver())
	}

	/// Broadcasts a record to every current subscriber and returns how many
	/// there were. With no subscribers the record is dropped.
	pub fn emit(&self, record: OutcomeRecord) -> usize {
		match self.sender.try_broadcast(record) {
			Ok(_) => self.sender.receiver_count(),
			Err(TrySendError::Inactive(_) | TrySendError::Closed(_) | TrySendError::Full(_)) => 0,
		}
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

/// Subscription to the outcome stream.
#[derive(Clone)]
pub struct OutcomeReceiver(Receiver<OutcomeRecord>);

impl OutcomeReceiver {
	/// Waits for the next record.
	///
	/// # Errors
	///
	/// [`ShipperError::StreamClosed`] once the shipper is gone and every
	/// buffered record was read, [`ShipperError::Lagged`] when records were
	/// dropped because this subscriber fell behind.
	pub async fn recv(&mut self) -> Result<OutcomeRecord> {
		match self.0.recv().await {
			Ok(record) => Ok(record),
			Err(RecvError::Closed) => Err(ShipperError::StreamClosed),
			Err(RecvError::Overflowed(n)) => Err(ShipperError::Lagged(n)),
		}
	}

	/// Returns the next record if one is already buffered.
	///
	/// # Errors
	///
	/// Same as [`Self::recv`], plus [`ShipperError::Empty`] when nothing is buffered.
	pub fn try_recv(&mut self) -> Result<OutcomeRecord> {
		match self.0.try_recv() {
			Ok(record) => Ok(record),
			Err(TryRecvError::Closed) => Err(ShipperError::StreamClosed),
			Err(TryRecvError::Overflowed(n)) => Err(ShipperError::Lagged(n)),
			Err(TryRecvError::Empty) => Err(ShipperError::Empty),
		}
	}
}
