use thiserror::Error;

/// Result type for shipper operations
pub type Result<T> = std::result::Result<T, ShipperError>;

/// Errors surfaced to the host application.
///
/// Delivery failures never show up here. They travel through the outcome
/// stream as [`crate::OutcomeRecord`]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShipperError {
	#[error("Invalid shipper options: {0}")]
	InvalidOptions(String),

	#[error("Failed to build HTTP client: {0}")]
	HttpClient(String),

	/// The shipper owning the outcome stream is gone
	#[error("Outcome stream closed")]
	StreamClosed,

	/// The subscriber fell behind and the oldest records were dropped
	#[error("Outcome stream lagged, {0} records dropped")]
	Lagged(u64),

	#[error("Outcome stream empty")]
	Empty,
}

/// Failure of a delivery attempt before any response arrived.
///
/// The `Display` output doubles as the outcome `code`, so it stays short.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
	#[error("Request timed out")]
	Timeout,

	#[error("Failed to connect")]
	Connect,

	#[error("{0}")]
	Transport(String),
}

impl DeliveryError {
	/// Short description used as the `code` of a failed outcome record.
	#[must_use]
	pub fn code(&self) -> String {
		self.to_string()
	}
}

impl From<reqwest::Error> for DeliveryError {
	fn from(error: reqwest::Error) -> Self {
		if error.is_timeout() {
			Self::Timeout
		} else if error.is_connect() {
			Self::Connect
		} else {
			Self::Transport(error.without_url().to_string())
		}
	}
}
