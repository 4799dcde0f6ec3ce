//! Seam to the identity agent client.
//!
//! Key management and request signing live in the agent client; the broker
//! only drives it through [`AgentClient`] and creates instances through a
//! [`ClientFactory`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyward_protocol::{Identifier, Passcode, SignedHeaders};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
	#[error("agent unreachable: {0}")]
	Transport(String),

	#[error("agent rejected the request: {0}")]
	Rejected(String),

	#[error("unexpected agent response: {0}")]
	Protocol(String),
}

/// Snapshot of the controller/agent state reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
	#[serde(default)]
	pub controller_id: Option<String>,
	#[serde(default)]
	pub agent_id: Option<String>,
}

impl AgentState {
	/// Controller identifier, ignoring blank values.
	pub fn controller(&self) -> Option<&str> {
		self.controller_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
	}
}

/// Request to be signed on behalf of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
	pub origin: String,
	pub method: String,
	pub path: String,
}

/// A live (or connectable) identity agent client.
#[async_trait]
pub trait AgentClient: Send + Sync {
	/// Boots and handshakes with the agent.
	async fn connect(&self) -> Result<(), AgentError>;

	async fn state(&self) -> Result<AgentState, AgentError>;

	/// Produces signed request headers for the identifier named `identifier`.
	async fn sign_headers(&self, identifier: &str, request: &SignRequest) -> Result<SignedHeaders, AgentError>;

	/// Identifiers managed by the controller.
	async fn identifiers(&self) -> Result<Vec<Identifier>, AgentError>;
}

/// Builds unconnected clients.
pub trait ClientFactory: Send + Sync {
	fn create(&self, agent_url: &Url, passcode: &Passcode) -> Result<Arc<dyn AgentClient>, AgentError>;
}

/// Agent call failure including the call-level timeout.
#[derive(Debug, thiserror::Error)]
pub enum AgentCallError {
	#[error(transparent)]
	Agent(AgentError),

	#[error("agent did not answer within {} ms", .0.as_millis())]
	Timeout(Duration),
}

/// Runs an agent call, bounded by `limit` when set.
pub(crate) async fn call_agent<T, F>(limit: Option<Duration>, call: F) -> Result<T, AgentCallError>
where
	F: Future<Output = Result<T, AgentError>>,
{
	match limit {
		Some(limit) => match tokio::time::timeout(limit, call).await {
			Ok(result) => result.map_err(AgentCallError::Agent),
			Err(_) => Err(AgentCallError::Timeout(limit)),
		},
		None => call.await.map_err(AgentCallError::Agent),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_controller_id_counts_as_missing() {
		let state = AgentState {
			controller_id: Some("  ".into()),
			agent_id: None,
		};
		assert_eq!(state.controller(), None);

		let state = AgentState {
			controller_id: Some("test-controller-id".into()),
			agent_id: None,
		};
		assert_eq!(state.controller(), Some("test-controller-id"));
	}

	#[tokio::test(start_paused = true)]
	async fn call_agent_times_out() {
		let slow = async {
			tokio::time::sleep(Duration::from_secs(5)).await;
			Ok::<_, AgentError>(())
		};
		let err = call_agent(Some(Duration::from_secs(1)), slow).await.unwrap_err();
		assert!(matches!(err, AgentCallError::Timeout(limit) if limit == Duration::from_secs(1)));
	}

	#[tokio::test]
	async fn call_agent_without_limit_passes_errors_through() {
		let failing = async { Err::<(), _>(AgentError::Transport("refused".into())) };
		let err = call_agent(None, failing).await.unwrap_err();
		assert!(matches!(err, AgentCallError::Agent(AgentError::Transport(_))));
	}
}
