//! Reply envelope and payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Identifier, SignedHeaders, SigninRecord};

/// Result of a request: either `{ "data": ... }` or `{ "error": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply<T = Value> {
	Data { data: T },
	Error { error: ReplyError },
}

impl<T> Reply<T> {
	pub fn data(data: T) -> Self {
		Reply::Data { data }
	}

	pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
		Reply::Error {
			error: ReplyError {
				code,
				message: message.into(),
				details: None,
			},
		}
	}

	pub fn is_ok(&self) -> bool {
		matches!(self, Reply::Data { .. })
	}

	/// Returns the success payload, if any.
	pub fn into_data(self) -> Option<T> {
		match self {
			Reply::Data { data } => Some(data),
			Reply::Error { .. } => None,
		}
	}

	pub fn as_error(&self) -> Option<&ReplyError> {
		match self {
			Reply::Data { .. } => None,
			Reply::Error { error } => Some(error),
		}
	}
}

/// Error information for failed requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	ConnectFailed,
	NotConnected,
	AgentError,
	Timeout,
	StorageError,
	InvalidInput,
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::ConnectFailed => write!(f, "CONNECT_FAILED"),
			ErrorCode::NotConnected => write!(f, "NOT_CONNECTED"),
			ErrorCode::AgentError => write!(f, "AGENT_ERROR"),
			ErrorCode::Timeout => write!(f, "TIMEOUT"),
			ErrorCode::StorageError => write!(f, "STORAGE_ERROR"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// `fetch-signins` and `update-auto-signin` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninsPayload {
	pub signins: Vec<SigninRecord>,
}

/// `delete-signin` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPayload {
	pub is_deleted: bool,
	pub signins: Vec<SigninRecord>,
}

/// `create-signin` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayload {
	pub signin: SigninRecord,
	pub signins: Vec<SigninRecord>,
}

/// `get-auto-signin` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSigninPayload {
	pub signin: Option<SigninRecord>,
}

/// `is-connected` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
	pub connected: bool,
}

/// `get-signed-headers` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadersPayload {
	pub headers: SignedHeaders,
}

/// `fetch-identifiers` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiersPayload {
	pub identifiers: Vec<Identifier>,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn data_reply_serializes_under_data_key() {
		let reply = Reply::data(json!({ "connected": true }));
		assert_eq!(serde_json::to_value(&reply).unwrap(), json!({ "data": { "connected": true } }));
	}

	#[test]
	fn error_reply_uses_screaming_codes() {
		let reply: Reply = Reply::error(ErrorCode::NotConnected, "no session");
		assert_eq!(
			serde_json::to_value(&reply).unwrap(),
			json!({ "error": { "code": "NOT_CONNECTED", "message": "no session" } })
		);
		assert_eq!(ErrorCode::NotConnected.to_string(), "NOT_CONNECTED");
	}

	#[test]
	fn typed_reply_parses_error_branch() {
		let reply: Reply<ConnectedPayload> = serde_json::from_value(json!({
			"error": { "code": "TIMEOUT", "message": "agent did not answer" }
		}))
		.unwrap();
		assert!(!reply.is_ok());
		assert_eq!(reply.as_error().map(|e| e.code), Some(ErrorCode::Timeout));
	}
}
