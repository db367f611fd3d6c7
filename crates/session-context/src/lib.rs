//! Stable per-day session identifier derived from the current user id.
//!
//! The id is published as a [`SessionContext`] that hosts merge into the
//! context of a telemetry shipper.

pub mod error;
pub mod provider;
pub mod store;

pub use error::{Result, SessionError};
pub use provider::{session_id, GlobalSessionContextProvider, SessionContext, SessionReceiver, CONTEXT_PROVIDER_NAME};
pub use store::{MemorySessionStore, SessionStore, SESSION_STORAGE_KEY};
