use crate::endpoint::{self, BuildHeaders, BuildUrl, SendTo, UrlOptions};
use crate::error::{Result, ShipperError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTCOME_CAPACITY: usize = 256;

/// Options for an [`crate::HttpShipper`].
///
/// ```rust,no_run
/// use event_shipper::{SendTo, ShipperOptions};
/// use std::time::Duration;
///
/// let options = ShipperOptions::new("my-channel", "1.2.3")
/// 	.send_to(SendTo::Production)
/// 	.flush_interval(Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct ShipperOptions {
	/// Channel all events are streamed to
	pub channel_name: String,
	/// Product version, sent as a header
	pub version: String,
	pub send_to: SendTo,
	/// Appends `debug=true` to every request
	pub debug: bool,
	/// Fixed period of the dispatch timer
	pub flush_interval: Duration,
	/// Upper bound of a single delivery attempt
	pub request_timeout: Duration,
	/// Unread records each outcome subscriber may hold before lagging
	pub outcome_capacity: usize,
	build_url: BuildUrl,
	build_headers: BuildHeaders,
}

impl ShipperOptions {
	pub fn new(channel_name: impl Into<String>, version: impl Into<String>) -> Self {
		Self {
			channel_name: channel_name.into(),
			version: version.into(),
			send_to: SendTo::default(),
			debug: false,
			flush_interval: DEFAULT_FLUSH_INTERVAL,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			outcome_capacity: DEFAULT_OUTCOME_CAPACITY,
			build_url: Arc::new(endpoint::build_url),
			build_headers: Arc::new(endpoint::build_headers),
		}
	}

	#[must_use]
	pub const fn send_to(mut self, send_to: SendTo) -> Self {
		self.send_to = send_to;
		self
	}

	#[must_use]
	pub const fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	#[must_use]
	pub const fn flush_interval(mut self, interval: Duration) -> Self {
		self.flush_interval = interval;
		self
	}

	#[must_use]
	pub const fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	#[must_use]
	pub const fn outcome_capacity(mut self, capacity: usize) -> Self {
		self.outcome_capacity = capacity;
		self
	}

	/// Overrides the URL resolver.
	#[must_use]
	pub fn build_url<F>(mut self, build_url: F) -> Self
	where
		F: Fn(&UrlOptions) -> String + Send + Sync + 'static,
	{
		self.build_url = Arc::new(build_url);
		self
	}

	/// Overrides the header resolver.
	#[must_use]
	pub fn build_headers<F>(mut self, build_headers: F) -> Self
	where
		F: Fn(&str, &str, Option<&str>) -> BTreeMap<String, String> + Send + Sync + 'static,
	{
		self.build_headers = Arc::new(build_headers);
		self
	}

	/// # Errors
	///
	/// [`ShipperError::InvalidOptions`] for an empty channel name or version,
	/// or a zero flush interval.
	pub fn validate(&self) -> Result<()> {
		if self.channel_name.trim().is_empty() {
			return Err(ShipperError::InvalidOptions("channel name must not be empty".to_string()));
		}
		if self.version.trim().is_empty() {
			return Err(ShipperError::InvalidOptions("version must not be empty".to_string()));
		}
		if self.flush_interval.is_zero() {
			return Err(ShipperError::InvalidOptions("flush interval must be greater than zero".to_string()));
		}
		Ok(())
	}

	pub(crate) fn url(&self) -> String {
		(self.build_url)(&UrlOptions {
			send_to: self.send_to,
			channel_name: self.channel_name.clone(),
		})
	}

	pub(crate) fn headers(&self, cluster_uuid: &str, license_id: Option<&str>) -> BTreeMap<String, String> {
		(self.build_headers)(cluster_uuid, &self.version, license_id)
	}
}

impl fmt::Debug for ShipperOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ShipperOptions")
			.field("channel_name", &self.channel_name)
			.field("version", &self.version)
			.field("send_to", &self.send_to)
			.field("debug", &self.debug)
			.field("flush_interval", &self.flush_interval)
			.field("request_timeout", &self.request_timeout)
			.field("outcome_capacity", &self.outcome_capacity)
			.finish_non_exhaustive()
	}
}
