//! gridlab progress event bus.
//!
//! - [`ProgressEvent`]: the immutable event envelope produced from
//!   worker output.
//! - [`ProgressBus`]: one fan-out [`ProgressChannel`] per job class.
//! - [`Subscription`]: a consumer's bounded queue, shedding log events
//!   first under overload.
//! - [`JobEmitter`]: per-job producer that stamps sequence numbers and
//!   guarantees a single, final terminal event.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod queue;

pub use bus::{ChannelStats, ProgressBus, ProgressChannel, Subscription};
pub use emitter::JobEmitter;
pub use event::{EventPayload, LogStream, ProgressEvent};
pub use queue::Recv;
