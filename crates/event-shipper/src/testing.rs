use crate::delivery::{Delivery, DeliveryRequest, DeliveryResponse};
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reply = Result<DeliveryResponse, DeliveryError>;

/// Delivery double that records every request and answers from a script.
#[derive(Clone)]
pub(crate) struct RecordingDelivery {
	inner: Arc<Inner>,
}

struct Inner {
	requests: Mutex<Vec<DeliveryRequest>>,
	replies: Mutex<VecDeque<Reply>>,
	fallback: Reply,
	latency: Option<Duration>,
}

impl RecordingDelivery {
	pub(crate) fn new(fallback: Reply, latency: Option<Duration>) -> Self {
		Self {
			inner: Arc::new(Inner {
				requests: Mutex::new(Vec::new()),
				replies: Mutex::new(VecDeque::new()),
				fallback,
				latency,
			}),
		}
	}

	pub(crate) fn ok() -> Self {
		Self::new(Ok(DeliveryResponse::from_status(200)), None)
	}

	pub(crate) fn slow(latency: Duration) -> Self {
		Self::new(Ok(DeliveryResponse::from_status(200)), Some(latency))
	}

	/// Answer the next call with `reply`, then fall back again.
	pub(crate) fn reply_once(&self, reply: Reply) {
		self.inner.replies.lock().unwrap().push_back(reply);
	}

	pub(crate) fn calls(&self) -> usize {
		self.inner.requests.lock().unwrap().len()
	}

	pub(crate) fn requests(&self) -> Vec<DeliveryRequest> {
		self.inner.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl Delivery for RecordingDelivery {
	async fn send(&self, request: DeliveryRequest) -> Reply {
		self.inner.requests.lock().unwrap().push(request);

		if let Some(latency) = self.inner.latency {
			tokio::time::sleep(latency).await;
		}

		let scripted = self.inner.replies.lock().unwrap().pop_front();
		scripted.unwrap_or_else(|| self.inner.fallback.clone())
	}
}
