use crate::event::Event;

/// Unbounded, insertion-ordered queue of events waiting for delivery.
///
/// The buffer itself is plain bookkeeping; the shipper keeps it behind its
/// state mutex so that `push` and `drain_all` never interleave.
#[derive(Debug, Default)]
pub struct EventBuffer {
	events: Vec<Event>,
}

impl EventBuffer {
	#[must_use]
	pub const fn new() -> Self {
		Self { events: Vec::new() }
	}

	/// Appends events to the tail, preserving their order.
	pub fn push<I>(&mut self, events: I)
	where
		I: IntoIterator<Item = Event>,
	{
		self.events.extend(events);
	}

	/// Removes and returns everything currently buffered.
	pub fn drain_all(&mut self) -> Vec<Event> {
		std::mem::take(&mut self.events)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.events.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}
}
