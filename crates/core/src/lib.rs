//! Background session broker for an identity-agent browser extension.
//!
//! The broker keeps at most one live connection to the identity agent,
//! disconnects it after an idle period, and serves the popup and content
//! scripts through a closed set of typed requests.
//!
//! # Components
//!
//! - [`IdentityStore`] persists the controller id and passcode together
//! - [`SessionManager`] owns the client handle, the idle alarm and the
//!   single-flight connect path
//! - [`SigninRegistry`] owns the per-site [`SigninRecord`] collection
//! - [`MessageRouter`] dispatches [`Request`]s and pushes reload
//!   notifications to the active tab after mutations
//!
//! # Example
//!
//! ```ignore
//! let (alarms, fired) = TokioAlarms::new();
//! let background = Background::builder(factory, alarms, tabs)
//!     .storage(Storage::new(Arc::new(FileStorage::open(dir).await?)))
//!     .config(Config::load(path)?)
//!     .build()?;
//!
//! tokio::spawn(background.clone().run_alarms(fired));
//! tokio::spawn(background.clone().serve(inbound));
//! let reply = background.router().dispatch(Request::IsConnected).await;
//! ```

pub mod agent;
pub mod background;
pub mod config;
pub mod error;
pub mod identity;
pub mod router;
pub mod session;
pub mod signins;
pub mod testing;

pub use agent::{AgentClient, AgentError, AgentState, ClientFactory, SignRequest};
pub use background::{Background, BackgroundBuilder, Inbound};
pub use config::Config;
pub use error::{ConnectError, Error, RegistryError, Result, SessionError};
pub use identity::{IdentityStore, StoredCredentials};
pub use keyward_protocol::{ErrorCode, Identifier, Passcode, Reply, ReplyError, Request, SignedHeaders, SigninRecord, TabState};
pub use keyward_runtime::{Alarms, Storage, StorageArea, StorageScope, TabMessenger};
pub use router::MessageRouter;
pub use session::{IDLE_ALARM, SessionManager, SessionStatus};
pub use signins::SigninRegistry;

pub(crate) fn now_ms() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
