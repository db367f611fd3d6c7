use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cluster id reported until the host extends the context with a real one.
pub const UNKNOWN_CLUSTER_UUID: &str = "UNKNOWN";

/// A single telemetry event as reported by the host application.
///
/// Field order is the wire order: one event serializes to
/// `{"timestamp":..,"event_type":..,"context":{..},"properties":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	/// ISO-8601 timestamp
	pub timestamp: String,
	pub event_type: String,
	#[serde(default)]
	pub context: Map<String, Value>,
	#[serde(default)]
	pub properties: Map<String, Value>,
}

impl Event {
	/// Creates an event of the given type stamped with the current UTC time.
	pub fn new(event_type: impl Into<String>) -> Self {
		Self {
			timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
			event_type: event_type.into(),
			context: Map::new(),
			properties: Map::new(),
		}
	}

	#[must_use]
	pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
		self.timestamp = timestamp.into();
		self
	}

	#[must_use]
	pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.context.insert(key.into(), value.into());
		self
	}

	#[must_use]
	pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.properties.insert(key.into(), value.into());
		self
	}
}

/// Partial context handed to `extend_context`.
///
/// Only `cluster_uuid` and `license_id` influence outbound requests; any
/// other key is kept so hosts can round-trip their full context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_uuid: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub license_id: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl EventContext {
	#[must_use]
	pub fn with_cluster_uuid(mut self, cluster_uuid: impl Into<String>) -> Self {
		self.cluster_uuid = Some(cluster_uuid.into());
		self
	}

	#[must_use]
	pub fn with_license_id(mut self, license_id: impl Into<String>) -> Self {
		self.license_id = Some(license_id.into());
		self
	}

	#[must_use]
	pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	/// Merges `update` into `self`. Keys present in the update win, absent
	/// keys leave the held value untouched.
	pub fn merge(&mut self, update: Self) {
		if update.cluster_uuid.is_some() {
			self.cluster_uuid = update.cluster_uuid;
		}
		if update.license_id.is_some() {
			self.license_id = update.license_id;
		}
		self.extra.extend(update.extra);
	}

	/// Cluster id used in outbound headers.
	#[must_use]
	pub fn cluster_uuid_or_unknown(&self) -> &str {
		self.cluster_uuid.as_deref().unwrap_or(UNKNOWN_CLUSTER_UUID)
	}
}
