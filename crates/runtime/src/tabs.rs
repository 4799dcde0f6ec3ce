//! Messaging toward the active tab's content script.

use async_trait::async_trait;
use keyward_protocol::{TabMessage, TabState};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
	#[error("no active tab")]
	NoActiveTab,

	#[error("no content script answered in the active tab")]
	NoReceiver,

	#[error("tab messaging channel closed")]
	Closed,

	#[error("tab did not answer within {0} ms")]
	Timeout(u64),

	#[error("tab messaging failed: {0}")]
	Transport(String),
}

/// Outbound half of the tab notification contract.
#[async_trait]
pub trait TabMessenger: Send + Sync {
	/// Asks the active tab for its current display state.
	async fn get_tab_state(&self) -> Result<TabState, NotifyError>;

	/// Tells the active tab to refetch and re-render in `state.mode`.
	async fn reload_state(&self, state: &TabState) -> Result<(), NotifyError>;
}

/// A tab message awaiting delivery by the host.
///
/// The host answers `GetTabState` with `Ok(Some(state))` and `ReloadState`
/// with `Ok(None)`.
#[derive(Debug)]
pub struct TabRequest {
	pub message: TabMessage,
	pub reply: oneshot::Sender<Result<Option<TabState>, NotifyError>>,
}

/// [`TabMessenger`] that hands messages to the host over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTabMessenger {
	tx: mpsc::Sender<TabRequest>,
}

impl ChannelTabMessenger {
	pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TabRequest>) {
		let (tx, rx) = mpsc::channel(capacity);
		(Self { tx }, rx)
	}

	async fn send(&self, message: TabMessage) -> Result<Option<TabState>, NotifyError> {
		let (reply, reply_rx) = oneshot::channel();
		self.tx.send(TabRequest { message, reply }).await.map_err(|_| NotifyError::Closed)?;
		reply_rx.await.map_err(|_| NotifyError::Closed)?
	}
}

#[async_trait]
impl TabMessenger for ChannelTabMessenger {
	async fn get_tab_state(&self) -> Result<TabState, NotifyError> {
		self.send(TabMessage::GetTabState).await?.ok_or(NotifyError::NoReceiver)
	}

	async fn reload_state(&self, state: &TabState) -> Result<(), NotifyError> {
		self.send(TabMessage::ReloadState { mode: state.mode.clone() }).await.map(|_| ())
	}
}
