//! Durable, ordered, multi-consumer event queues over the coordination
//! store, plus the single-consumer leader election that guards each
//! queue's drain loop.

mod election;
mod error;
mod queue;
mod settling;

pub use election::Election;
pub use error::QueueError;
pub use queue::EventQueue;
pub use settling::{remaining_delay, wait_for_settling, DEFAULT_SETTLING_DELAY};
