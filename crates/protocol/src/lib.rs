//! Message contract between extension pages and the keyward background.
//!
//! Popup and content scripts send a [`Request`], tagged by its `type` field,
//! and get back a [`Reply`] that is either `{ "data": ... }` or
//! `{ "error": ... }`. After a mutation the background pushes a
//! [`TabMessage`] to the active tab so it can refresh.
//!
//! Nothing here touches storage or the agent; `keyward` builds the broker
//! on top of these shapes.

pub mod record;
pub mod reply;
pub mod request;
pub mod tab;

pub use record::*;
pub use reply::*;
pub use request::*;
pub use tab::*;
