//! Named one-shot alarms.
//!
//! Same contract as extension alarms: creating an alarm with a name that is
//! already scheduled replaces it, and a fired alarm is forgotten.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A scheduled alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmInfo {
	pub name: String,
	pub delay: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
	#[error("alarm backend error: {0}")]
	Backend(String),
}

#[async_trait]
pub trait Alarms: Send + Sync {
	/// Schedules `name` to fire once after `delay`, replacing any alarm with the same name.
	async fn create(&self, name: &str, delay: Duration) -> Result<(), AlarmError>;

	/// Cancels `name`. Returns whether an alarm was scheduled.
	async fn clear(&self, name: &str) -> Result<bool, AlarmError>;

	async fn get(&self, name: &str) -> Result<Option<AlarmInfo>, AlarmError>;
}

struct PendingAlarm {
	info: AlarmInfo,
	generation: u64,
	task: JoinHandle<()>,
}

/// Alarm backend built on tokio timers.
///
/// Fired alarm names are delivered on the receiver returned by
/// [`TokioAlarms::new`]; the host loop forwards them to the broker.
pub struct TokioAlarms {
	pending: Arc<Mutex<HashMap<String, PendingAlarm>>>,
	generation: AtomicU64,
	fired: mpsc::UnboundedSender<String>,
}

impl TokioAlarms {
	pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
		let (fired, fired_rx) = mpsc::unbounded_channel();
		let alarms = Arc::new(Self {
			pending: Arc::new(Mutex::new(HashMap::new())),
			generation: AtomicU64::new(0),
			fired,
		});
		(alarms, fired_rx)
	}

	/// Number of alarms currently scheduled.
	pub fn scheduled(&self) -> usize {
		self.pending.lock().len()
	}
}

#[async_trait]
impl Alarms for TokioAlarms {
	async fn create(&self, name: &str, delay: Duration) -> Result<(), AlarmError> {
		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let mut pending = self.pending.lock();

		let task = {
			let pending = Arc::clone(&self.pending);
			let fired = self.fired.clone();
			let name = name.to_string();
			tokio::spawn(async move {
				tokio::time::sleep(delay).await;
				{
					let mut pending = pending.lock();
					if !pending.get(&name).is_some_and(|alarm| alarm.generation == generation) {
						return;
					}
					pending.remove(&name);
				}
				debug!(target = "keyward.alarms", %name, "alarm fired");
				let _ = fired.send(name);
			})
		};

		let replaced = pending.insert(
			name.to_string(),
			PendingAlarm {
				info: AlarmInfo {
					name: name.to_string(),
					delay,
				},
				generation,
				task,
			},
		);
		if let Some(old) = replaced {
			old.task.abort();
			debug!(target = "keyward.alarms", %name, "replaced scheduled alarm");
		}
		debug!(target = "keyward.alarms", %name, delay_ms = delay.as_millis() as u64, "alarm scheduled");
		Ok(())
	}

	async fn clear(&self, name: &str) -> Result<bool, AlarmError> {
		let removed = self.pending.lock().remove(name);
		Ok(match removed {
			Some(alarm) => {
				alarm.task.abort();
				debug!(target = "keyward.alarms", %name, "alarm cleared");
				true
			}
			None => false,
		})
	}

	async fn get(&self, name: &str) -> Result<Option<AlarmInfo>, AlarmError> {
		Ok(self.pending.lock().get(name).map(|alarm| alarm.info.clone()))
	}
}

impl Drop for TokioAlarms {
	fn drop(&mut self) {
		for (_, alarm) in self.pending.lock().drain() {
			alarm.task.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn alarm_fires_once_after_delay() {
		let (alarms, mut fired) = TokioAlarms::new();
		alarms.create("passcode-timeout", Duration::from_secs(300)).await.unwrap();

		tokio::time::sleep(Duration::from_secs(299)).await;
		assert!(fired.try_recv().is_err());

		tokio::time::sleep(Duration::from_secs(2)).await;
		assert_eq!(fired.recv().await.as_deref(), Some("passcode-timeout"));
		assert_eq!(alarms.scheduled(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn recreating_replaces_previous_alarm() {
		let (alarms, mut fired) = TokioAlarms::new();
		alarms.create("t", Duration::from_secs(60)).await.unwrap();
		tokio::time::sleep(Duration::from_secs(30)).await;
		alarms.create("t", Duration::from_secs(60)).await.unwrap();
		assert_eq!(alarms.scheduled(), 1);

		tokio::time::sleep(Duration::from_secs(45)).await;
		assert!(fired.try_recv().is_err(), "first alarm must not fire after replacement");

		tokio::time::sleep(Duration::from_secs(20)).await;
		assert_eq!(fired.recv().await.as_deref(), Some("t"));
		assert!(fired.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn cleared_alarm_never_fires() {
		let (alarms, mut fired) = TokioAlarms::new();
		alarms.create("t", Duration::from_secs(10)).await.unwrap();
		assert_eq!(alarms.get("t").await.unwrap().map(|a| a.delay), Some(Duration::from_secs(10)));

		assert!(alarms.clear("t").await.unwrap());
		assert!(!alarms.clear("t").await.unwrap());

		tokio::time::sleep(Duration::from_secs(20)).await;
		assert!(fired.try_recv().is_err());
	}
}
