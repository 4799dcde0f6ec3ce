//! Reload notifications toward the active tab.

use std::time::Duration;

use keyward_runtime::{NotifyError, TabMessenger};
use tracing::debug;

/// Asks the active tab for its display mode, then tells it to reload in that mode.
pub async fn reload_active_tab(tabs: &dyn TabMessenger, limit: Duration) -> Result<(), NotifyError> {
	let timeout = || NotifyError::Timeout(limit.as_millis() as u64);

	let state = tokio::time::timeout(limit, tabs.get_tab_state()).await.map_err(|_| timeout())??;
	tokio::time::timeout(limit, tabs.reload_state(&state)).await.map_err(|_| timeout())??;

	debug!(target = "keyward.router", mode = %state.mode, "active tab reloaded");
	Ok(())
}
