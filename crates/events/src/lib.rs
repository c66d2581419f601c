//! Job event distribution.
//!
//! - [`Broadcaster`]: per-job fan-out of [`JobEvent`]s, one queue per
//!   subscription.
//! - [`ObserverSession`]: one observer's merged event stream and local
//!   job records.
//! - [`JobEvent`]: the status/log/terminal event envelope.

pub mod broadcaster;
pub mod event;
pub mod session;

pub use broadcaster::{Broadcaster, Subscription};
pub use event::JobEvent;
pub use session::{ObserverSession, TrackedJob};
