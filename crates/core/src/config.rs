//! Broker configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
	/// Minutes of inactivity before the session is dropped.
	pub idle_timeout_minutes: u64,
	/// Limit for each call to the identity agent; `0` disables it.
	pub request_timeout_ms: u64,
	/// Limit for each message to the active tab.
	pub notify_timeout_ms: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
			notify_timeout_ms: DEFAULT_NOTIFY_TIMEOUT_MS,
		}
	}
}

impl Config {
	pub fn from_json(json: &str) -> Result<Self> {
		let config: Config = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads and validates a JSON config file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	pub fn validate(&self) -> Result<()> {
		if self.idle_timeout_minutes == 0 {
			return Err(Error::Config("idleTimeoutMinutes must be greater than zero".into()));
		}
		if self.notify_timeout_ms == 0 {
			return Err(Error::Config("notifyTimeoutMs must be greater than zero".into()));
		}
		Ok(())
	}

	pub fn idle_timeout(&self) -> Duration {
		Duration::from_secs(self.idle_timeout_minutes.saturating_mul(60))
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		(self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
	}

	pub fn notify_timeout(&self) -> Duration {
		Duration::from_millis(self.notify_timeout_ms)
	}

	pub fn with_idle_timeout_minutes(mut self, minutes: u64) -> Self {
		self.idle_timeout_minutes = minutes;
		self
	}

	pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
		self.request_timeout_ms = ms;
		self
	}
}
