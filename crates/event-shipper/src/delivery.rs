//! Delivery transport: ndjson encoding, the outbound request seam and
//! outcome classification.

use crate::error::{DeliveryError, Result, ShipperError};
use crate::event::Event;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// One outbound POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
	pub url: String,
	pub headers: BTreeMap<String, String>,
	/// Newline-delimited JSON, one event per line, trailing newline
	pub body: String,
	/// Adds the `debug=true` query parameter
	pub debug: bool,
}

/// What came back from the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResponse {
	pub status: u16,
	pub ok: bool,
}

impl DeliveryResponse {
	/// A response is ok when its status is 2xx.
	#[must_use]
	pub const fn from_status(status: u16) -> Self {
		Self {
			status,
			ok: status >= 200 && status < 300,
		}
	}
}

/// Outbound request seam.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
	/// # Errors
	///
	/// A [`DeliveryError`] when no response arrived at all. Non-2xx
	/// responses are not errors at this level.
	async fn send(&self, request: DeliveryRequest) -> std::result::Result<DeliveryResponse, DeliveryError>;
}

/// `reqwest` backed delivery.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
	client: reqwest::Client,
}

impl HttpDelivery {
	/// # Errors
	///
	/// [`ShipperError::HttpClient`] if the TLS backend cannot be initialised.
	pub fn new(request_timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder().timeout(request_timeout).build().map_err(|e| ShipperError::HttpClient(e.to_string()))?;
		Ok(Self { client })
	}

	#[must_use]
	pub const fn with_client(client: reqwest::Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl Delivery for HttpDelivery {
	async fn send(&self, request: DeliveryRequest) -> std::result::Result<DeliveryResponse, DeliveryError> {
		let mut builder = self.client.post(&request.url);
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if request.debug {
			builder = builder.query(&[("debug", "true")]);
		}

		let response = builder.body(request.body).send().await?;
		let status = response.status();

		if request.debug {
			match response.text().await {
				Ok(text) => debug!(status = status.as_u16(), body = %text, "Delivery response"),
				Err(e) => debug!(status = status.as_u16(), "Failed to read delivery response body: {}", e),
			}
		}

		Ok(DeliveryResponse::from_status(status.as_u16()))
	}
}

/// Serializes events as ndjson, preserving order.
///
/// An event that fails to serialize is skipped and logged; with
/// `serde_json::Map` payloads this cannot happen in practice.
#[must_use]
pub fn encode_ndjson(events: &[Event]) -> String {
	let mut body = String::new();
	for event in events {
		match serde_json::to_string(event) {
			Ok(line) => {
				body.push_str(&line);
				body.push('\n');
			}
			Err(e) => warn!(event_type = %event.event_type, "Skipping event that failed to serialize: {}", e),
		}
	}
	body
}

/// Maps the result of one attempt to `(outcome, code)`.
#[must_use]
pub fn classify(result: &std::result::Result<DeliveryResponse, DeliveryError>) -> (Outcome, String) {
	match result {
		Ok(response) if response.ok => (Outcome::Succeeded, response.status.to_string()),
		Ok(response) => (Outcome::Failed, response.status.to_string()),
		Err(error) => (Outcome::Failed, error.code()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_encode_single_event() {
		let events = vec![Event::new("test-event-type").with_timestamp("2020-01-01T00:00:00.000Z")];

		assert_eq!(
			encode_ndjson(&events),
			"{\"timestamp\":\"2020-01-01T00:00:00.000Z\",\"event_type\":\"test-event-type\",\"context\":{},\"properties\":{}}\n"
		);
	}

	#[test]
	fn test_encode_preserves_order_one_line_each() {
		let events = vec![
			Event::new("first").with_property("n", 1),
			Event::new("second").with_property("n", 2),
			Event::new("third").with_property("n", 3),
		];

		let body = encode_ndjson(&events);
		let lines: Vec<_> = body.lines().collect();

		assert!(body.ends_with('\n'));
		assert_eq!(lines.len(), 3);
		for (line, expected) in lines.iter().zip(["first", "second", "third"]) {
			let decoded: Event = serde_json::from_str(line).unwrap();
			assert_eq!(decoded.event_type, expected);
		}
	}

	#[test]
	fn test_response_ok_is_2xx() {
		assert!(DeliveryResponse::from_status(200).ok);
		assert!(DeliveryResponse::from_status(204).ok);
		assert!(!DeliveryResponse::from_status(301).ok);
		assert!(!DeliveryResponse::from_status(400).ok);
		assert!(!DeliveryResponse::from_status(503).ok);
	}

	#[test]
	fn test_classify() {
		assert_eq!(classify(&Ok(DeliveryResponse::from_status(200))), (Outcome::Succeeded, "200".to_string()));
		assert_eq!(classify(&Ok(DeliveryResponse::from_status(400))), (Outcome::Failed, "400".to_string()));
		assert_eq!(classify(&Err(DeliveryError::Transport("X".into()))), (Outcome::Failed, "X".to_string()));
		assert_eq!(classify(&Err(DeliveryError::Timeout)), (Outcome::Failed, "Request timed out".to_string()));
	}
}
