//! Session lifecycle and agent-connection subsystem.
//!
//! This module owns the single live agent client, the idle-timeout alarm, and
//! the connect/reconnect/disconnect state machine.

/// Session manager and connect orchestration.
pub mod manager;

use serde::{Deserialize, Serialize};

/// Session manager and connect orchestration.
pub use manager::SessionManager;

/// Name of the alarm that drops an idle session.
pub const IDLE_ALARM: &str = "passcode-timeout";

/// Connection state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}
