//! Wiring for the background process.
//!
//! [`Background`] assembles the session manager, signin registry and router
//! from host collaborators, and runs the two event sources a host feeds it:
//! inbound messages and fired alarms.

use std::sync::Arc;

use keyward_runtime::{Alarms, Storage, TabMessenger};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::agent::ClientFactory;
use crate::config::Config;
use crate::error::Result;
use crate::router::MessageRouter;
use crate::session::SessionManager;
use crate::signins::SigninRegistry;

/// Raw inbound message with its reply slot.
#[derive(Debug)]
pub struct Inbound {
	pub raw: String,
	pub reply: oneshot::Sender<String>,
}

/// The assembled broker. Cheap to clone.
#[derive(Clone)]
pub struct Background {
	router: Arc<MessageRouter>,
}

impl Background {
	pub fn builder(factory: Arc<dyn ClientFactory>, alarms: Arc<dyn Alarms>, tabs: Arc<dyn TabMessenger>) -> BackgroundBuilder {
		BackgroundBuilder {
			factory,
			alarms,
			tabs,
			storage: None,
			config: Config::default(),
		}
	}

	pub fn router(&self) -> &Arc<MessageRouter> {
		&self.router
	}

	pub fn session(&self) -> &Arc<SessionManager> {
		self.router.session()
	}

	pub fn signins(&self) -> &Arc<SigninRegistry> {
		self.router.signins()
	}

	/// Forwards fired alarm names to the router until the channel closes.
	pub async fn run_alarms(self, mut fired: mpsc::UnboundedReceiver<String>) {
		while let Some(name) = fired.recv().await {
			self.router.on_alarm(&name).await;
		}
		debug!(target = "keyward.background", "alarm channel closed");
	}

	/// Serves inbound messages until the channel closes.
	///
	/// Each message runs on its own task, so a slow connect does not block a
	/// status check; the session manager serializes what must be serialized.
	pub async fn serve(self, mut inbound: mpsc::Receiver<Inbound>) {
		info!(target = "keyward.background", "serving messages");
		while let Some(Inbound { raw, reply }) = inbound.recv().await {
			let router = Arc::clone(&self.router);
			tokio::spawn(async move {
				let encoded = router.dispatch_json(&raw).await;
				if reply.send(encoded).is_err() {
					debug!(target = "keyward.background", "sender went away before reply");
				}
			});
		}
		debug!(target = "keyward.background", "inbound channel closed");
	}
}

/// Builder for [`Background`].
pub struct BackgroundBuilder {
	factory: Arc<dyn ClientFactory>,
	alarms: Arc<dyn Alarms>,
	tabs: Arc<dyn TabMessenger>,
	storage: Option<Storage>,
	config: Config,
}

impl BackgroundBuilder {
	/// Sets the storage service. Defaults to in-memory storage.
	pub fn storage(mut self, storage: Storage) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn config(mut self, config: Config) -> Self {
		self.config = config;
		self
	}

	pub fn build(self) -> Result<Background> {
		self.config.validate()?;
		let storage = self.storage.unwrap_or_else(Storage::in_memory);
		let session = Arc::new(SessionManager::new(self.factory, storage.clone(), self.alarms, self.config));
		let signins = Arc::new(SigninRegistry::new(storage));
		Ok(Background {
			router: Arc::new(MessageRouter::new(session, signins, self.tabs)),
		})
	}
}
