//! Host collaborators consumed by the keyward broker.
//!
//! The broker never talks to browser APIs directly. It goes through the
//! traits in this crate, which a host wires to real extension APIs and tests
//! wire to in-memory doubles:
//!
//! * [`storage`]: key/value areas over the `local`, `session` and `sync` scopes
//! * [`alarms`]: named one-shot timers
//! * [`tabs`]: notifications toward the active tab's content script

pub mod alarms;
pub mod storage;
pub mod tabs;

pub use alarms::{AlarmError, AlarmInfo, Alarms, TokioAlarms};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageArea, StorageError, StorageScope};
pub use tabs::{ChannelTabMessenger, NotifyError, TabMessenger, TabRequest};
