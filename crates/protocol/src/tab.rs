//! Background to content-script notifications.

use serde::{Deserialize, Serialize};

/// Display state reported by a content script.
///
/// The mode string is owned by the page UI; the broker only echoes it back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
	#[serde(default)]
	pub mode: String,
}

impl TabState {
	pub fn new(mode: impl Into<String>) -> Self {
		Self { mode: mode.into() }
	}
}

/// Messages pushed to the active tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TabMessage {
	/// Ask the content script for its current [`TabState`].
	GetTabState,
	/// Tell the content script to refetch and re-render.
	ReloadState { mode: String },
}
