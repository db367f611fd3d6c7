/// Tri-state opt-in flag.
///
/// `Unset` blocks dispatch exactly like `Denied` but lets callers tell
/// "never decided" from "explicitly opted out". Once decided, the state never
/// returns to `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsentState {
	#[default]
	Unset,
	Granted,
	Denied,
}

impl ConsentState {
	#[must_use]
	pub const fn from_granted(granted: bool) -> Self {
		if granted {
			Self::Granted
		} else {
			Self::Denied
		}
	}

	#[must_use]
	pub const fn is_granted(self) -> bool {
		matches!(self, Self::Granted)
	}

	#[must_use]
	pub const fn is_decided(self) -> bool {
		!matches!(self, Self::Unset)
	}
}

/// Consent gate owned by a single shipper.
#[derive(Debug, Default)]
pub struct ConsentGate {
	state: ConsentState,
}

impl ConsentGate {
	#[must_use]
	pub const fn new() -> Self {
		Self { state: ConsentState::Unset }
	}

	/// Records the opt-in decision and returns the previous state.
	pub fn set(&mut self, granted: bool) -> ConsentState {
		std::mem::replace(&mut self.state, ConsentState::from_granted(granted))
	}

	#[must_use]
	pub const fn state(&self) -> ConsentState {
		self.state
	}

	#[must_use]
	pub const fn is_granted(&self) -> bool {
		self.state.is_granted()
	}
}
