//! Session orchestration for agent connection and lifecycle.

use std::sync::Arc;

use keyward_protocol::{Identifier, Passcode, SignedHeaders};
use keyward_runtime::{AlarmError, Alarms, Storage, StorageError};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use url::Url;

use super::{IDLE_ALARM, SessionStatus};
use crate::agent::{AgentClient, ClientFactory, SignRequest, call_agent};
use crate::config::Config;
use crate::error::{ConnectError, SessionError};
use crate::identity::IdentityStore;

struct LiveSession {
	client: Arc<dyn AgentClient>,
	agent_url: Url,
	passcode: Passcode,
	controller_id: String,
}

impl LiveSession {
	fn matches(&self, agent_url: &Url, passcode: &Passcode) -> bool {
		&self.agent_url == agent_url && &self.passcode == passcode
	}
}

#[derive(Default)]
struct Session {
	live: Option<LiveSession>,
}

/// Owner of the single live agent connection.
///
/// All access to the client handle goes through this type. Connect attempts
/// are serialized by holding the session lock for the whole attempt, so
/// concurrent callers queue behind the first one and then reuse the handle it
/// created instead of building their own.
pub struct SessionManager {
	factory: Arc<dyn ClientFactory>,
	identity: IdentityStore,
	alarms: Arc<dyn Alarms>,
	config: Config,
	session: Mutex<Session>,
	status: watch::Sender<SessionStatus>,
	last_activity_at: SyncMutex<Option<u64>>,
}

impl SessionManager {
	pub fn new(factory: Arc<dyn ClientFactory>, storage: Storage, alarms: Arc<dyn Alarms>, config: Config) -> Self {
		let (status, _) = watch::channel(SessionStatus::Disconnected);
		Self {
			factory,
			identity: IdentityStore::new(storage),
			alarms,
			config,
			session: Mutex::new(Session::default()),
			status,
			last_activity_at: SyncMutex::new(None),
		}
	}

	pub fn identity(&self) -> &IdentityStore {
		&self.identity
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn status(&self) -> SessionStatus {
		*self.status.borrow()
	}

	/// Watches status transitions, including `Connecting`.
	pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
		self.status.subscribe()
	}

	/// Unix milliseconds of the last connect or signed operation.
	pub fn last_activity_at(&self) -> Option<u64> {
		*self.last_activity_at.lock()
	}

	/// Controller id of the live session.
	pub async fn controller_id(&self) -> Option<String> {
		self.session.lock().await.live.as_ref().map(|live| live.controller_id.clone())
	}

	/// Returns whether a client handle exists, without querying or reconnecting.
	pub async fn has_live_session(&self) -> bool {
		self.session.lock().await.live.is_some()
	}

	/// Connects to the agent at `agent_url`.
	///
	/// Reuses the live client when it was built from the same URL and
	/// passcode. Any failure leaves the session disconnected and the stored
	/// credentials untouched.
	pub async fn connect(&self, agent_url: &str, passcode: &Passcode) -> Result<(), ConnectError> {
		let mut session = self.session.lock().await;
		self.connect_locked(&mut session, agent_url, passcode).await
	}

	/// Returns whether a session is live, reconnecting from stored credentials if needed.
	///
	/// This is the fused check-and-ensure operation: with no handle it tries a
	/// silent reconnect, with a handle it queries the agent state. Errors
	/// degrade to `false` and drop the handle. Use [`has_live_session`] for a
	/// check without side effects.
	///
	/// [`has_live_session`]: Self::has_live_session
	pub async fn is_connected(&self) -> bool {
		let mut session = self.session.lock().await;
		if session.live.is_none() && !self.reconnect_locked(&mut session).await {
			return false;
		}

		let Some(client) = session.live.as_ref().map(|live| Arc::clone(&live.client)) else {
			return false;
		};

		match call_agent(self.config.request_timeout(), client.state()).await {
			Ok(state) if state.controller().is_some() => true,
			Ok(_) => {
				warn!(target = "keyward.session", "agent state has no controller; dropping session");
				self.drop_live(&mut session).await;
				false
			}
			Err(err) => {
				debug!(target = "keyward.session", error = %err, "state query failed; treating session as disconnected");
				self.drop_live(&mut session).await;
				false
			}
		}
	}

	/// Drops the live client and cancels the idle alarm. Stored credentials are kept.
	pub async fn disconnect(&self) {
		let mut session = self.session.lock().await;
		if session.live.is_some() {
			info!(target = "keyward.session", "disconnecting from identity agent");
		}
		self.drop_live(&mut session).await;
	}

	/// Disconnects and forgets the stored passcode and controller id.
	pub async fn logout(&self) -> Result<(), StorageError> {
		self.disconnect().await;
		self.identity.clear().await?;
		info!(target = "keyward.session", "stored credentials cleared");
		Ok(())
	}

	/// Handles a fired alarm. Returns whether the session was dropped.
	///
	/// A fired alarm is no longer scheduled, so a pending idle alarm means the
	/// session was re-armed after this one fired and the event is stale.
	pub async fn on_alarm(&self, name: &str) -> bool {
		if name != IDLE_ALARM {
			debug!(target = "keyward.session", %name, "ignoring unrelated alarm");
			return false;
		}

		let mut session = self.session.lock().await;
		match self.alarms.get(IDLE_ALARM).await {
			Ok(Some(_)) => {
				debug!(target = "keyward.session", "idle alarm re-armed since it fired; ignoring");
				return false;
			}
			Ok(None) => {}
			Err(err) => warn!(target = "keyward.session", error = %err, "failed to inspect idle alarm; disconnecting"),
		}

		info!(target = "keyward.session", "idle timeout reached");
		self.drop_live(&mut session).await;
		true
	}

	/// Signs a request for `identifier`, reconnecting first if needed.
	pub async fn sign_headers(&self, identifier: &Identifier, request: &SignRequest) -> Result<SignedHeaders, SessionError> {
		let client = self.ensure_client().await?;
		let headers = call_agent(self.config.request_timeout(), client.sign_headers(&identifier.name, request)).await?;
		debug!(
			target = "keyward.session",
			identifier = %identifier.name,
			origin = %request.origin,
			"signed request headers"
		);
		self.record_activity().await;
		Ok(headers)
	}

	/// Lists the controller's identifiers, reconnecting first if needed.
	pub async fn identifiers(&self) -> Result<Vec<Identifier>, SessionError> {
		let client = self.ensure_client().await?;
		Ok(call_agent(self.config.request_timeout(), client.identifiers()).await?)
	}

	async fn ensure_client(&self) -> Result<Arc<dyn AgentClient>, SessionError> {
		if !self.is_connected().await {
			return Err(SessionError::NotConnected);
		}
		self.session
			.lock()
			.await
			.live
			.as_ref()
			.map(|live| Arc::clone(&live.client))
			.ok_or(SessionError::NotConnected)
	}

	async fn connect_locked(&self, session: &mut Session, agent_url: &str, passcode: &Passcode) -> Result<(), ConnectError> {
		let result = self.try_connect(session, agent_url, passcode).await;
		if let Err(err) = &result {
			warn!(target = "keyward.session", error = %err, "connect failed; session cleared");
			self.drop_live(session).await;
		}
		result
	}

	async fn try_connect(&self, session: &mut Session, agent_url: &str, passcode: &Passcode) -> Result<(), ConnectError> {
		let agent_url = parse_agent_url(agent_url)?;
		if passcode.is_empty() {
			return Err(ConnectError::InvalidCredentials("passcode is empty".into()));
		}

		if let Some(live) = session.live.as_ref() {
			if live.matches(&agent_url, passcode) {
				debug!(target = "keyward.session", agent_url = %agent_url, "reusing live agent client");
				self.arm_idle_alarm().await?;
				self.touch();
				self.status.send_replace(SessionStatus::Connected);
				return Ok(());
			}
			info!(target = "keyward.session", "credentials changed; replacing live agent client");
			session.live = None;
		}

		self.status.send_replace(SessionStatus::Connecting);
		let limit = self.config.request_timeout();
		let client = self.factory.create(&agent_url, passcode)?;
		call_agent(limit, client.connect()).await?;
		let state = call_agent(limit, client.state()).await?;
		let controller_id = state.controller().ok_or(ConnectError::MissingController)?.to_string();

		self.identity.save(&agent_url, passcode, &controller_id).await?;
		self.arm_idle_alarm().await?;

		info!(target = "keyward.session", %controller_id, agent_url = %agent_url, "connected to identity agent");
		session.live = Some(LiveSession {
			client,
			agent_url,
			passcode: passcode.clone(),
			controller_id,
		});
		self.touch();
		self.status.send_replace(SessionStatus::Connected);
		Ok(())
	}

	async fn reconnect_locked(&self, session: &mut Session) -> bool {
		let stored = match self.identity.load().await {
			Ok(Some(stored)) => stored,
			Ok(None) => return false,
			Err(err) => {
				warn!(target = "keyward.session", error = %err, "failed to read stored credentials");
				return false;
			}
		};

		debug!(target = "keyward.session", controller_id = %stored.controller_id, "reconnecting with stored credentials");
		self.connect_locked(session, stored.agent_url.as_str(), &stored.passcode).await.is_ok()
	}

	async fn drop_live(&self, session: &mut Session) {
		session.live = None;
		self.status.send_replace(SessionStatus::Disconnected);
		if let Err(err) = self.alarms.clear(IDLE_ALARM).await {
			warn!(target = "keyward.session", error = %err, "failed to cancel idle alarm");
		}
	}

	/// Clears any pending idle alarm, then schedules a fresh one.
	async fn arm_idle_alarm(&self) -> Result<(), AlarmError> {
		self.alarms.clear(IDLE_ALARM).await?;
		self.alarms.create(IDLE_ALARM, self.config.idle_timeout()).await
	}

	async fn record_activity(&self) {
		let session = self.session.lock().await;
		if session.live.is_none() {
			return;
		}
		self.touch();
		if let Err(err) = self.arm_idle_alarm().await {
			warn!(target = "keyward.session", error = %err, "failed to re-arm idle alarm");
		}
	}

	fn touch(&self) {
		*self.last_activity_at.lock() = Some(crate::now_ms());
	}
}

fn parse_agent_url(raw: &str) -> Result<Url, ConnectError> {
	let url = Url::parse(raw.trim()).map_err(|err| ConnectError::InvalidCredentials(format!("agent url {raw:?} is invalid: {err}")))?;
	match url.scheme() {
		"http" | "https" => Ok(url),
		other => Err(ConnectError::InvalidCredentials(format!("agent url scheme {other:?} is not supported"))),
	}
}
