use crate::error::{Result, SessionError};
use crate::store::{SessionStore, SESSION_STORAGE_KEY};
use async_broadcast::{broadcast, InactiveReceiver, Receiver, RecvError, Sender, TryRecvError, TrySendError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name the context is registered under.
pub const CONTEXT_PROVIDER_NAME: &str = "global_session";

const CHANGES_CAPACITY: usize = 16;

/// Context published by [`GlobalSessionContextProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
	pub global_session: String,
}

/// Lowercase hex SHA-256 of `"{organization}:{user}:{YYYY-MM-DD}"`.
///
/// A missing organization renders as `undefined`.
#[must_use]
pub fn session_id(organization_id: Option<&str>, user_id: &str, day: NaiveDate) -> String {
	let input = format!("{}:{}:{}", organization_id.unwrap_or("undefined"), user_id, day.format("%Y-%m-%d"));
	hex::encode(Sha256::digest(input.as_bytes()))
}

fn utc_today() -> NaiveDate {
	Utc::now().date_naive()
}

/// Turns a stream of user ids into a deduplicated stream of session contexts.
///
/// A previously stored session id, if any, is the initial value. Every id
/// computed afterwards is written back to the store, but only changes are
/// published.
pub struct GlobalSessionContextProvider {
	user_tx: mpsc::UnboundedSender<String>,
	context_rx: watch::Receiver<Option<SessionContext>>,
	changes: Sender<SessionContext>,
	_keep_alive: InactiveReceiver<SessionContext>,
	cancel_token: CancellationToken,
	task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl GlobalSessionContextProvider {
	/// Starts the provider task. Requires a Tokio runtime.
	pub fn register(organization_id: Option<String>, store: Arc<dyn SessionStore>) -> Self {
		Self::with_clock(organization_id, store, utc_today)
	}

	/// Same as [`Self::register`] with an explicit source for the current day.
	pub fn with_clock(organization_id: Option<String>, store: Arc<dyn SessionStore>, today: fn() -> NaiveDate) -> Self {
		let stored = store.get(SESSION_STORAGE_KEY).filter(|id| !id.is_empty());
		if let Some(id) = &stored {
			debug!("Restored global session {}", id);
		}

		let (context_tx, context_rx) = watch::channel(stored.clone().map(|global_session| SessionContext { global_session }));

		let (mut changes, receiver) = broadcast::<SessionContext>(CHANGES_CAPACITY);
		changes.set_await_active(false);
		changes.set_overflow(true);

		let (user_tx, user_rx) = mpsc::unbounded_channel();
		let cancel_token = CancellationToken::new();

		let task = SessionTask {
			organization_id,
			store,
			today,
			user_rx,
			context_tx,
			changes: changes.clone(),
			last: stored,
			cancel_token: cancel_token.clone(),
		};
		let task_handle = tokio::spawn(task.run());

		Self {
			user_tx,
			context_rx,
			changes,
			_keep_alive: receiver.deactivate(),
			cancel_token,
			task_handle: Mutex::new(Some(task_handle)),
		}
	}

	/// Feeds the next user id. Empty ids are ignored.
	///
	/// # Errors
	///
	/// [`SessionError::Stopped`] once the provider was stopped.
	pub fn set_user_id(&self, user_id: impl Into<String>) -> Result<()> {
		self.user_tx.send(user_id.into()).map_err(|_| SessionError::Stopped)
	}

	/// Input handle for hosts that push user ids from elsewhere.
	#[must_use]
	pub fn user_ids(&self) -> mpsc::UnboundedSender<String> {
		self.user_tx.clone()
	}

	#[must_use]
	pub fn current(&self) -> Option<SessionContext> {
		self.context_rx.borrow().clone()
	}

	#[must_use]
	pub fn watch(&self) -> watch::Receiver<Option<SessionContext>> {
		self.context_rx.clone()
	}

	/// Subscribes to session changes published from now on.
	#[must_use]
	pub fn subscribe(&self) -> SessionReceiver {
		SessionReceiver(self.changes.new_receiver())
	}

	pub async fn stop(&self) {
		self.cancel_token.cancel();

		if let Some(handle) = self.task_handle.lock().await.take() {
			if let Err(e) = handle.await {
				warn!("Session provider task failed: {}", e);
			}
		}
	}
}

impl Drop for GlobalSessionContextProvider {
	fn drop(&mut self) {
		self.cancel_token.cancel();
	}
}

struct SessionTask {
	organization_id: Option<String>,
	store: Arc<dyn SessionStore>,
	today: fn() -> NaiveDate,
	user_rx: mpsc::UnboundedReceiver<String>,
	context_tx: watch::Sender<Option<SessionContext>>,
	changes: Sender<SessionContext>,
	last: Option<String>,
	cancel_token: CancellationToken,
}

impl SessionTask {
	async fn run(mut self) {
		info!("Global session provider started");

		loop {
			tokio::select! {
				biased;

				() = self.cancel_token.cancelled() => {
					break;
				}
				user_id = self.user_rx.recv() => {
					match user_id {
						Some(user_id) => self.handle_user_id(&user_id),
						None => break,
					}
				}
			}
		}

		info!("Global session provider stopped");
	}

	fn handle_user_id(&mut self, user_id: &str) {
		if user_id.is_empty() {
			debug!("Ignoring empty user id");
			return;
		}

		let id = session_id(self.organization_id.as_deref(), user_id, (self.today)());
		self.store.set(SESSION_STORAGE_KEY, &id);

		if self.last.as_deref() == Some(id.as_str()) {
			return;
		}
		self.last = Some(id.clone());

		let context = SessionContext { global_session: id };
		self.context_tx.send_replace(Some(context.clone()));

		match self.changes.try_broadcast(context) {
			Ok(_) | Err(TrySendError::Inactive(_)) => {}
			Err(e) => warn!("Failed to publish session change: {}", e),
		}
	}
}

/// Subscription to session changes.
pub struct SessionReceiver(Receiver<SessionContext>);

impl SessionReceiver {
	/// # Errors
	///
	/// [`SessionError::StreamClosed`] once the provider is gone,
	/// [`SessionError::Lagged`] when this subscriber fell behind.
	pub async fn recv(&mut self) -> Result<SessionContext> {
		match self.0.recv().await {
			Ok(context) => Ok(context),
			Err(RecvError::Closed) => Err(SessionError::StreamClosed),
			Err(RecvError::Overflowed(n)) => Err(SessionError::Lagged(n)),
		}
	}

	/// # Errors
	///
	/// Same as [`Self::recv`], plus [`SessionError::Empty`] when nothing is buffered.
	pub fn try_recv(&mut self) -> Result<SessionContext> {
		match self.0.try_recv() {
			Ok(context) => Ok(context),
			Err(TryRecvError::Closed) => Err(SessionError::StreamClosed),
			Err(TryRecvError::Overflowed(n)) => Err(SessionError::Lagged(n)),
			Err(TryRecvError::Empty) => Err(SessionError::Empty),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemorySessionStore;
	use tokio::time::{timeout, Duration};

	const USER1: &str = "e4d3fa408fc9882d6079ec39d09ebe0080a7ef6e44c68b077d702f04c9ea385b";
	const USER2: &str = "57bfd7638f8f4a4dbec7cad7f7c5c5729a1b1c369b80d12f6d9eff8cf21bf8c4";
	const ORG1_USER1: &str = "3de398aba32389db9327d6f2564f1a82e87d8d328264c201b141716e6662d396";
	const ORG1_USER2: &str = "2c08ab456bd3b7d473f431ff9b66940ffb8a3cdd996a0b0513ec61de40723045";

	fn new_year() -> NaiveDate {
		NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
	}

	fn provider(organization_id: Option<&str>, store: &Arc<MemorySessionStore>) -> GlobalSessionContextProvider {
		let store: Arc<dyn SessionStore> = store.clone();
		GlobalSessionContextProvider::with_clock(organization_id.map(str::to_string), store, new_year)
	}

	async fn next_session(rx: &mut SessionReceiver) -> String {
		timeout(Duration::from_secs(5), rx.recv()).await.expect("no session emitted").expect("session stream closed").global_session
	}

	#[test]
	fn test_session_id_is_stable() {
		assert_eq!(session_id(None, "user1", new_year()), USER1);
		assert_eq!(session_id(None, "user2", new_year()), USER2);
		assert_eq!(session_id(Some("org1"), "user1", new_year()), ORG1_USER1);
		assert_eq!(session_id(Some("org1"), "user2", new_year()), ORG1_USER2);
	}

	#[test]
	fn test_session_id_changes_with_day() {
		let next_day = NaiveDate::from_ymd_opt(2022, 1, 2).unwrap();

		assert_eq!(session_id(Some("org1"), "user1", next_day), "e5255847426e0473784a9f91224cb27439a3331b665d8b01b201cf4e07f26c72");
	}

	#[test]
	fn test_context_serializes() {
		let context = SessionContext {
			global_session: "abc".to_string(),
		};

		assert_eq!(serde_json::to_value(&context).unwrap(), serde_json::json!({ "global_session": "abc" }));
	}

	#[tokio::test]
	async fn test_emits_only_changes() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(None, &store);
		let mut rx = provider.subscribe();

		assert_eq!(provider.current(), None);

		provider.set_user_id("user1").unwrap();
		assert_eq!(next_session(&mut rx).await, USER1);

		provider.set_user_id("user2").unwrap();
		assert_eq!(next_session(&mut rx).await, USER2);

		provider.set_user_id("user1").unwrap();
		assert_eq!(next_session(&mut rx).await, USER1);

		// The repeated user1 must not show up before the change to user2
		provider.set_user_id("user1").unwrap();
		provider.set_user_id("user2").unwrap();
		assert_eq!(next_session(&mut rx).await, USER2);

		assert_eq!(store.get(SESSION_STORAGE_KEY).as_deref(), Some(USER2));
		assert_eq!(provider.current().map(|c| c.global_session).as_deref(), Some(USER2));
	}

	#[tokio::test]
	async fn test_emits_with_organization_id() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(Some("org1"), &store);
		let mut rx = provider.subscribe();

		provider.set_user_id("user1").unwrap();
		assert_eq!(next_session(&mut rx).await, ORG1_USER1);

		provider.set_user_id("user2").unwrap();
		assert_eq!(next_session(&mut rx).await, ORG1_USER2);
	}

	#[tokio::test]
	async fn test_starts_from_stored_session() {
		let store = Arc::new(MemorySessionStore::with_session("previously_stored_session_id"));
		let provider = provider(Some("org1"), &store);
		let mut rx = provider.subscribe();

		assert_eq!(provider.current().map(|c| c.global_session).as_deref(), Some("previously_stored_session_id"));

		provider.set_user_id("user1").unwrap();
		assert_eq!(next_session(&mut rx).await, ORG1_USER1);
		assert_eq!(store.get(SESSION_STORAGE_KEY).as_deref(), Some(ORG1_USER1));
	}

	#[tokio::test]
	async fn test_stored_session_matching_computed_is_not_repeated() {
		let store = Arc::new(MemorySessionStore::with_session(ORG1_USER1));
		let provider = provider(Some("org1"), &store);
		let mut rx = provider.subscribe();

		provider.set_user_id("user1").unwrap();
		provider.set_user_id("user2").unwrap();

		assert_eq!(next_session(&mut rx).await, ORG1_USER2);
	}

	#[tokio::test]
	async fn test_empty_user_id_is_ignored() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(None, &store);
		let mut rx = provider.subscribe();

		provider.set_user_id("").unwrap();
		provider.set_user_id("user1").unwrap();

		assert_eq!(next_session(&mut rx).await, USER1);
	}

	#[tokio::test]
	async fn test_watch_follows_changes() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(None, &store);
		let mut watch = provider.watch();

		provider.user_ids().send("user1".to_string()).unwrap();
		timeout(Duration::from_secs(5), watch.changed()).await.unwrap().unwrap();

		assert_eq!(watch.borrow().as_ref().map(|c| c.global_session.as_str()), Some(USER1));
	}

	#[tokio::test]
	async fn test_stop_rejects_new_user_ids() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(None, &store);

		provider.stop().await;
		provider.stop().await;

		assert_eq!(provider.set_user_id("user1"), Err(SessionError::Stopped));
		assert_eq!(store.get(SESSION_STORAGE_KEY), None);
	}

	#[tokio::test]
	async fn test_stream_closes_when_provider_dropped() {
		let store = Arc::new(MemorySessionStore::new());
		let provider = provider(None, &store);
		let mut rx = provider.subscribe();

		drop(provider);

		let result = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
		assert_eq!(result, Err(SessionError::StreamClosed));
	}
}
