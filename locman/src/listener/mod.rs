//! Subscriptions to location and address updates.
//!
//! A [`Listener`] holds exactly one handler, either for locations or for
//! addresses ([`ListenerKind`]). Each listener owns:
//!
//! - a delivery queue drained by its own task, on a runtime the subscriber
//!   may choose, so a slow handler never blocks the registry
//! - an optional time-to-live timer that delivers
//!   [`LocationError::Timeout`](crate::LocationError::Timeout) if nothing
//!   arrives in time
//!
//! # Lifecycle
//!
//! ```text
//! subscribe ──► active ──► emit ──► (once) retired
//!                 │  └──► timeout ──► (once) retired
//!                 └──► unlisten ──► retired ──► listen ──► active
//! ```
//!
//! Every path into "retired" cancels the timer and closes the queue; the
//! first one wins and the rest are no-ops.

mod kind;
mod subscription;

pub use kind::{AddressCallback, AddressHandler, ListenerKind, LocationHandler};
pub use subscription::{Listener, ListenerId, ListenerOptions};

pub(crate) use kind::ListenerEvent;
pub(crate) use subscription::ListenerShared;
