//! In-memory doubles for the broker's collaborators.
//!
//! Provides a fake agent client factory, recording alarms and a recording tab
//! messenger for testing session and routing behavior without a browser or
//! an identity agent.
//!
//! # Example
//!
//! ```ignore
//! let factory = FakeClientFactory::new("test-controller-id");
//! let alarms = RecordingAlarms::new();
//! let manager = SessionManager::new(factory.clone(), Storage::in_memory(), alarms.clone(), Config::default());
//!
//! manager.connect("http://example.com/agent", &"test-passcode".into()).await?;
//! assert_eq!(factory.created(), 1);
//! assert_eq!(alarms.active().len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keyward_protocol::{Identifier, Passcode, SignedHeaders, TabState};
use keyward_runtime::{AlarmError, AlarmInfo, Alarms, NotifyError, TabMessenger};
use parking_lot::Mutex;
use url::Url;

use crate::agent::{AgentClient, AgentError, AgentState, ClientFactory, SignRequest};

/// Knobs shared by a factory and every client it built.
#[derive(Debug, Clone, Default)]
struct FakeBehavior {
	controller_id: Option<String>,
	accepted_passcode: Option<String>,
	connect_error: Option<AgentError>,
	state_error: Option<AgentError>,
	handshake_delay: Duration,
	identifiers: Vec<Identifier>,
}

/// Factory producing [`FakeAgentClient`]s and counting them.
#[derive(Debug, Default)]
pub struct FakeClientFactory {
	behavior: Arc<Mutex<FakeBehavior>>,
	signed: Arc<Mutex<Vec<(String, SignRequest)>>>,
	created: AtomicUsize,
}

impl FakeClientFactory {
	/// Agents built by this factory report `controller_id`.
	pub fn new(controller_id: &str) -> Arc<Self> {
		let factory = Self::default();
		factory.behavior.lock().controller_id = Some(controller_id.to_string());
		Arc::new(factory)
	}

	/// Number of clients created so far.
	pub fn created(&self) -> usize {
		self.created.load(Ordering::SeqCst)
	}

	/// Only `passcode` passes the handshake from now on.
	pub fn accept_only(&self, passcode: &str) {
		self.behavior.lock().accepted_passcode = Some(passcode.to_string());
	}

	/// Makes every handshake fail with `error`, or succeed again with `None`.
	pub fn fail_handshake(&self, error: Option<AgentError>) {
		self.behavior.lock().connect_error = error;
	}

	/// Makes every state query fail with `error`, or succeed again with `None`.
	pub fn fail_state(&self, error: Option<AgentError>) {
		self.behavior.lock().state_error = error;
	}

	pub fn set_controller_id(&self, controller_id: Option<&str>) {
		self.behavior.lock().controller_id = controller_id.map(str::to_string);
	}

	pub fn set_handshake_delay(&self, delay: Duration) {
		self.behavior.lock().handshake_delay = delay;
	}

	pub fn set_identifiers(&self, identifiers: Vec<Identifier>) {
		self.behavior.lock().identifiers = identifiers;
	}

	/// Identifier names and requests signed through any client of this factory.
	pub fn signed(&self) -> Vec<(String, SignRequest)> {
		self.signed.lock().clone()
	}
}

impl ClientFactory for FakeClientFactory {
	fn create(&self, _agent_url: &Url, passcode: &Passcode) -> Result<Arc<dyn AgentClient>, AgentError> {
		self.created.fetch_add(1, Ordering::SeqCst);
		Ok(Arc::new(FakeAgentClient {
			passcode: passcode.clone(),
			behavior: Arc::clone(&self.behavior),
			signed: Arc::clone(&self.signed),
		}))
	}
}

/// Agent client driven by its factory's [`FakeBehavior`].
pub struct FakeAgentClient {
	passcode: Passcode,
	behavior: Arc<Mutex<FakeBehavior>>,
	signed: Arc<Mutex<Vec<(String, SignRequest)>>>,
}

impl FakeAgentClient {
	fn behavior(&self) -> FakeBehavior {
		self.behavior.lock().clone()
	}
}

#[async_trait]
impl AgentClient for FakeAgentClient {
	async fn connect(&self) -> Result<(), AgentError> {
		let behavior = self.behavior();
		if !behavior.handshake_delay.is_zero() {
			tokio::time::sleep(behavior.handshake_delay).await;
		}
		if let Some(err) = behavior.connect_error {
			return Err(err);
		}
		match behavior.accepted_passcode {
			Some(accepted) if accepted != self.passcode.expose() => Err(AgentError::Rejected("passcode does not unlock this controller".into())),
			_ => Ok(()),
		}
	}

	async fn state(&self) -> Result<AgentState, AgentError> {
		let behavior = self.behavior();
		if let Some(err) = behavior.state_error {
			return Err(err);
		}
		Ok(AgentState {
			controller_id: behavior.controller_id,
			agent_id: Some("test-agent-id".into()),
		})
	}

	async fn sign_headers(&self, identifier: &str, request: &SignRequest) -> Result<SignedHeaders, AgentError> {
		self.signed.lock().push((identifier.to_string(), request.clone()));
		let mut headers = SignedHeaders::new();
		headers.insert("signify-resource".into(), identifier.to_string());
		headers.insert("signify-timestamp".into(), "2024-01-01T00:00:00.000000+00:00".into());
		headers.insert("signature".into(), format!("indexed=\"?0\";signify=\"{}:{}:{}\"", identifier, request.method, request.path));
		Ok(headers)
	}

	async fn identifiers(&self) -> Result<Vec<Identifier>, AgentError> {
		Ok(self.behavior().identifiers)
	}
}

/// Alarm operation seen by [`RecordingAlarms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
	Created { name: String, delay: Duration },
	Cleared { name: String, existed: bool },
}

/// Alarm backend that records calls and never fires on its own.
#[derive(Debug, Default)]
pub struct RecordingAlarms {
	active: Mutex<HashMap<String, Duration>>,
	events: Mutex<Vec<AlarmEvent>>,
}

impl RecordingAlarms {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Alarms currently scheduled, sorted by name.
	pub fn active(&self) -> Vec<AlarmInfo> {
		let mut active: Vec<_> = self
			.active
			.lock()
			.iter()
			.map(|(name, delay)| AlarmInfo {
				name: name.clone(),
				delay: *delay,
			})
			.collect();
		active.sort_by(|a, b| a.name.cmp(&b.name));
		active
	}

	pub fn events(&self) -> Vec<AlarmEvent> {
		self.events.lock().clone()
	}

	/// Fires `name` the way a real backend does: the alarm stops being
	/// scheduled. Returns whether it was scheduled.
	pub fn fire(&self, name: &str) -> bool {
		self.active.lock().remove(name).is_some()
	}

	/// Returns and clears the recorded events.
	pub fn take_events(&self) -> Vec<AlarmEvent> {
		std::mem::take(&mut *self.events.lock())
	}
}

#[async_trait]
impl Alarms for RecordingAlarms {
	async fn create(&self, name: &str, delay: Duration) -> Result<(), AlarmError> {
		self.active.lock().insert(name.to_string(), delay);
		self.events.lock().push(AlarmEvent::Created {
			name: name.to_string(),
			delay,
		});
		Ok(())
	}

	async fn clear(&self, name: &str) -> Result<bool, AlarmError> {
		let existed = self.active.lock().remove(name).is_some();
		self.events.lock().push(AlarmEvent::Cleared {
			name: name.to_string(),
			existed,
		});
		Ok(existed)
	}

	async fn get(&self, name: &str) -> Result<Option<AlarmInfo>, AlarmError> {
		Ok(self.active.lock().get(name).map(|delay| AlarmInfo {
			name: name.to_string(),
			delay: *delay,
		}))
	}
}

/// Tab messenger that records notifications.
#[derive(Debug, Default)]
pub struct RecordingTabs {
	state: Mutex<TabState>,
	failure: Mutex<Option<NotifyError>>,
	delay: Mutex<Duration>,
	state_queries: AtomicUsize,
	reloads: Mutex<Vec<String>>,
}

impl RecordingTabs {
	/// The active tab reports `state` when asked.
	pub fn new(state: TabState) -> Arc<Self> {
		let tabs = Self::default();
		*tabs.state.lock() = state;
		Arc::new(tabs)
	}

	/// Makes every message fail with `error`, or succeed again with `None`.
	pub fn fail_with(&self, error: Option<NotifyError>) {
		*self.failure.lock() = error;
	}

	/// Delays every `get-tab-state` answer.
	pub fn set_delay(&self, delay: Duration) {
		*self.delay.lock() = delay;
	}

	pub fn state_queries(&self) -> usize {
		self.state_queries.load(Ordering::SeqCst)
	}

	/// Modes sent with each `reload-state`.
	pub fn reloads(&self) -> Vec<String> {
		self.reloads.lock().clone()
	}
}

#[async_trait]
impl TabMessenger for RecordingTabs {
	async fn get_tab_state(&self) -> Result<TabState, NotifyError> {
		self.state_queries.fetch_add(1, Ordering::SeqCst);
		let delay = *self.delay.lock();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if let Some(err) = self.failure.lock().clone() {
			return Err(err);
		}
		Ok(self.state.lock().clone())
	}

	async fn reload_state(&self, state: &TabState) -> Result<(), NotifyError> {
		if let Some(err) = self.failure.lock().clone() {
			return Err(err);
		}
		self.reloads.lock().push(state.mode.clone());
		Ok(())
	}
}
