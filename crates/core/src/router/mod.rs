//! Request dispatch for the background broker.
//!
//! The router holds no state of its own: every [`Request`] carries its inputs,
//! and the only shared state is what the session manager and signin registry
//! own. Handlers run to completion before any reload notification is pushed to
//! the active tab, and notification failures never change the reply.

pub mod notify;

use std::sync::Arc;
use std::time::Duration;

use keyward_protocol::{
	AutoSigninPayload, ConnectedPayload, CreatedPayload, DeletedPayload, ErrorCode, HeadersPayload, IdentifiersPayload, Reply, Request,
	SigninsPayload,
};
use keyward_runtime::{NotifyError, TabMessenger};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::agent::SignRequest;
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::signins::SigninRegistry;

/// Handler output: reply payload plus whether the active tab should reload.
struct Handled {
	data: Value,
	notify: bool,
}

impl Handled {
	fn new<T: Serialize>(payload: T, notify: bool) -> Result<Self> {
		Ok(Self {
			data: serde_json::to_value(payload)?,
			notify,
		})
	}

	fn quiet<T: Serialize>(payload: T) -> Result<Self> {
		Self::new(payload, false)
	}

	fn reload<T: Serialize>(payload: T) -> Result<Self> {
		Self::new(payload, true)
	}
}

/// Dispatches requests to the session manager and signin registry.
pub struct MessageRouter {
	session: Arc<SessionManager>,
	signins: Arc<SigninRegistry>,
	tabs: Arc<dyn TabMessenger>,
	notify_timeout: Duration,
}

impl MessageRouter {
	pub fn new(session: Arc<SessionManager>, signins: Arc<SigninRegistry>, tabs: Arc<dyn TabMessenger>) -> Self {
		let notify_timeout = session.config().notify_timeout();
		Self {
			session,
			signins,
			tabs,
			notify_timeout,
		}
	}

	pub fn session(&self) -> &Arc<SessionManager> {
		&self.session
	}

	pub fn signins(&self) -> &Arc<SigninRegistry> {
		&self.signins
	}

	/// Handles one request and returns its reply.
	pub async fn dispatch(&self, request: Request) -> Reply {
		let kind = request.kind();
		debug!(target = "keyward.router", %kind, "dispatching request");

		match self.handle(request).await {
			Ok(Handled { data, notify }) => {
				if notify {
					self.notify_active_tab(kind).await;
				}
				Reply::data(data)
			}
			Err(err) => {
				debug!(target = "keyward.router", %kind, error = %err, "request failed");
				Reply::Error { error: err.to_reply_error() }
			}
		}
	}

	/// Parses a raw JSON message, dispatches it, and encodes the reply.
	pub async fn dispatch_json(&self, raw: &str) -> String {
		let reply = match serde_json::from_str::<Request>(raw) {
			Ok(request) => self.dispatch(request).await,
			Err(err) => Reply::error(ErrorCode::InvalidInput, format!("malformed request: {err}")),
		};
		serde_json::to_string(&reply).unwrap_or_else(|err| {
			warn!(target = "keyward.router", error = %err, "failed to encode reply");
			r#"{"error":{"code":"INTERNAL_ERROR","message":"failed to encode reply"}}"#.to_string()
		})
	}

	/// Forwards a fired alarm to the session and refreshes the page if it was the idle alarm.
	pub async fn on_alarm(&self, name: &str) -> bool {
		let handled = self.session.on_alarm(name).await;
		if handled {
			self.notify_active_tab("idle-timeout").await;
		}
		handled
	}

	async fn handle(&self, request: Request) -> Result<Handled> {
		match request {
			Request::FetchSignins => Handled::quiet(SigninsPayload {
				signins: self.signins.list().await?,
			}),
			Request::DeleteSignin { id } => {
				let (is_deleted, signins) = self.signins.delete(&id).await?;
				Handled::new(DeletedPayload { is_deleted, signins }, is_deleted)
			}
			Request::UpdateAutoSignin { signin } => Handled::reload(SigninsPayload {
				signins: self.signins.set_auto_signin(&signin).await?,
			}),
			Request::CreateSignin {
				domain,
				identifier,
				auto_signin,
			} => {
				if domain.trim().is_empty() {
					return Err(Error::InvalidInput("domain is required".into()));
				}
				let (signin, signins) = self.signins.create(&domain, identifier, auto_signin).await?;
				Handled::reload(CreatedPayload { signin, signins })
			}
			Request::GetAutoSignin { domain } => Handled::quiet(AutoSigninPayload {
				signin: self.signins.auto_signin_for(&domain).await?,
			}),
			Request::Connect { agent_url, passcode } => {
				self.session.connect(&agent_url, &passcode).await?;
				Handled::reload(json!({}))
			}
			Request::IsConnected => Handled::quiet(ConnectedPayload {
				connected: self.session.is_connected().await,
			}),
			Request::Disconnect => {
				self.session.disconnect().await;
				Handled::reload(json!({}))
			}
			Request::Logout => {
				self.session.logout().await?;
				Handled::reload(json!({}))
			}
			Request::FetchIdentifiers => Handled::quiet(IdentifiersPayload {
				identifiers: self.session.identifiers().await?,
			}),
			Request::GetSignedHeaders {
				origin,
				signin,
				method,
				path,
			} => {
				if origin.trim().is_empty() {
					return Err(Error::InvalidInput("origin is required".into()));
				}
				let request = SignRequest {
					origin,
					method: method.unwrap_or_else(|| "GET".into()).to_uppercase(),
					path: path.unwrap_or_else(|| "/".into()),
				};
				let headers = self.session.sign_headers(&signin.identifier, &request).await?;
				let touched = self.signins.touch(&signin.id).await.unwrap_or_else(|err| {
					warn!(target = "keyward.router", id = %signin.id, error = %err, "failed to record signin use");
					false
				});
				Handled::new(HeadersPayload { headers }, touched)
			}
		}
	}

	async fn notify_active_tab(&self, cause: &str) {
		match notify::reload_active_tab(self.tabs.as_ref(), self.notify_timeout).await {
			Ok(()) => {}
			Err(err @ (NotifyError::NoActiveTab | NotifyError::NoReceiver)) => {
				debug!(target = "keyward.router", %cause, error = %err, "no page to reload");
			}
			Err(err) => {
				warn!(target = "keyward.router", %cause, error = %err, "failed to reload active tab");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use keyward_protocol::TabState;

	use super::*;
	use crate::testing::RecordingTabs;

	#[tokio::test(start_paused = true)]
	async fn notify_times_out_on_silent_tab() {
		let tabs = RecordingTabs::new(TabState::new("signin"));
		tabs.set_delay(Duration::from_secs(10));

		let err = notify::reload_active_tab(tabs.as_ref(), Duration::from_secs(1)).await.unwrap_err();
		assert_eq!(err, NotifyError::Timeout(1000));
		assert!(tabs.reloads().is_empty());
	}

	#[tokio::test]
	async fn notify_asks_state_then_reloads_with_same_mode() {
		let tabs = RecordingTabs::new(TabState::new("signin"));
		notify::reload_active_tab(tabs.as_ref(), Duration::from_secs(1)).await.unwrap();
		assert_eq!(tabs.state_queries(), 1);
		assert_eq!(tabs.reloads(), vec!["signin".to_string()]);
	}
}
