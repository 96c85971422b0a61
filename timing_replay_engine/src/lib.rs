//! Client-side replay engine for a live timing feed.
//!
//! Messages go into an [`Engine`], which merges partial channel updates into
//! timestamped histories. A [`Scheduler`] republishes the state as of "now
//! minus the requested delay" on a fixed period.

pub mod clock;
pub mod inflate;
pub mod merge;
pub mod publish;
pub mod router;
pub mod scheduler;
pub mod stateful_buffer;
pub mod timed_buffer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use inflate::{Base64Deflate, DecodeError, Inflate};
pub use merge::merge;
pub use publish::{BroadcastPublisher, Publisher};
pub use router::Engine;
pub use scheduler::{Scheduler, SchedulerHandle};
