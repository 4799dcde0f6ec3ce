//! Error types for the broker.
//!
//! Each component has its own error enum; [`Error`] unifies them and maps
//! every failure onto a wire [`ErrorCode`] at the router boundary.

use std::time::Duration;

use keyward_protocol::{ErrorCode, ReplyError};
use keyward_runtime::{AlarmError, StorageError};

use crate::agent::{AgentCallError, AgentError};

/// Failure of a connect attempt. The session is always left disconnected.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
	#[error("invalid credentials: {0}")]
	InvalidCredentials(String),

	#[error("agent connection failed: {0}")]
	Agent(#[from] AgentError),

	#[error("agent state did not include a controller identifier")]
	MissingController,

	#[error("agent did not answer within {} ms", .0.as_millis())]
	Timeout(Duration),

	#[error("failed to persist credentials: {0}")]
	Storage(#[from] StorageError),

	#[error("failed to arm idle timeout: {0}")]
	Alarm(#[from] AlarmError),
}

impl From<AgentCallError> for ConnectError {
	fn from(err: AgentCallError) -> Self {
		match err {
			AgentCallError::Agent(err) => ConnectError::Agent(err),
			AgentCallError::Timeout(limit) => ConnectError::Timeout(limit),
		}
	}
}

/// Failure of an operation that needs a live session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("not connected to the identity agent")]
	NotConnected,

	#[error("agent request failed: {0}")]
	Agent(#[from] AgentError),

	#[error("agent did not answer within {} ms", .0.as_millis())]
	Timeout(Duration),
}

impl From<AgentCallError> for SessionError {
	fn from(err: AgentCallError) -> Self {
		match err {
			AgentCallError::Agent(err) => SessionError::Agent(err),
			AgentCallError::Timeout(limit) => SessionError::Timeout(limit),
		}
	}
}

/// Failure of a signin registry operation. Unknown ids are not errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("signin storage failed: {0}")]
	Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Connect(#[from] ConnectError),

	#[error(transparent)]
	Session(#[from] SessionError),

	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("invalid config: {0}")]
	Config(String),

	#[error("invalid request: {0}")]
	InvalidInput(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub fn code(&self) -> ErrorCode {
		match self {
			Error::Connect(ConnectError::InvalidCredentials(_)) => ErrorCode::InvalidInput,
			Error::Connect(ConnectError::Timeout(_)) => ErrorCode::Timeout,
			Error::Connect(_) => ErrorCode::ConnectFailed,
			Error::Session(SessionError::NotConnected) => ErrorCode::NotConnected,
			Error::Session(SessionError::Agent(_)) => ErrorCode::AgentError,
			Error::Session(SessionError::Timeout(_)) => ErrorCode::Timeout,
			Error::Registry(_) | Error::Storage(_) => ErrorCode::StorageError,
			Error::Config(_) | Error::InvalidInput(_) | Error::Json(_) => ErrorCode::InvalidInput,
			Error::Io(_) => ErrorCode::InternalError,
		}
	}

	/// Converts this error into the wire error payload.
	pub fn to_reply_error(&self) -> ReplyError {
		ReplyError {
			code: self.code(),
			message: self.to_string(),
			details: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn connect_errors_map_to_connect_failed() {
		let err = Error::from(ConnectError::Agent(AgentError::Rejected("bad passcode".into())));
		assert_eq!(err.code(), ErrorCode::ConnectFailed);
		assert_eq!(err.to_reply_error().message, "agent connection failed: agent rejected the request: bad passcode");
	}

	#[test]
	fn invalid_credentials_are_invalid_input() {
		let err = Error::from(ConnectError::InvalidCredentials("passcode is empty".into()));
		assert_eq!(err.code(), ErrorCode::InvalidInput);
	}

	#[test]
	fn timeouts_keep_their_code() {
		let err = Error::from(SessionError::from(AgentCallError::Timeout(Duration::from_millis(250))));
		assert_eq!(err.code(), ErrorCode::Timeout);
		assert_eq!(err.to_string(), "agent did not answer within 250 ms");
	}

	#[test]
	fn not_connected_is_distinct() {
		assert_eq!(Error::from(SessionError::NotConnected).code(), ErrorCode::NotConnected);
	}
}
