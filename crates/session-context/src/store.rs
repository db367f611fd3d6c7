use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Key the last emitted session id is stored under.
pub const SESSION_STORAGE_KEY: &str = "ebt_global_session";

/// Per-process key/value storage the provider remembers its last session in.
pub trait SessionStore: Send + Sync {
	fn get(&self, key: &str) -> Option<String>;

	fn set(&self, key: &str, value: &str);
}

/// In-memory [`SessionStore`]; lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
	entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A store that already holds `session_id` under [`SESSION_STORAGE_KEY`].
	#[must_use]
	pub fn with_session(session_id: impl Into<String>) -> Self {
		let session_id: String = session_id.into();
		let store = Self::new();
		store.set(SESSION_STORAGE_KEY, &session_id);
		store
	}
}

impl SessionStore for MemorySessionStore {
	fn get(&self, key: &str) -> Option<String> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value.to_string());
	}
}
