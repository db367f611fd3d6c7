use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
	/// The provider task is gone and no longer accepts user ids
	#[error("Session provider stopped")]
	Stopped,

	#[error("Session stream closed")]
	StreamClosed,

	#[error("Session stream lagged, {0} updates dropped")]
	Lagged(u64),

	#[error("Session stream empty")]
	Empty,
}
