//! Coordination-store abstraction shared by every component that needs
//! CS primitives: locks, sessions, CAS writes, watches.
//!
//! The real coordination service (a ZooKeeper-like hierarchical store)
//! is an external collaborator, not something this workspace runs;
//! [`CoordinationStore`] is the trait boundary, and [`MemoryStore`] is
//! the one in-process implementation used by tests and `railyard-sim`.

mod cancel;
mod error;
mod memory;
mod retry;
mod session;
mod store;

pub use cancel::CancelToken;
pub use error::{CoordError, Retryable};
pub use memory::MemoryStore;
pub use retry::{retry_blocking, retry_with_backoff, DEFAULT_BACKOFF};
pub use session::{Lease, SessionId, DEFAULT_LEASE};
pub use store::{CoordinationStore, CreateMode, LockHandle, NodeData};
