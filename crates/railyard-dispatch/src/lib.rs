//! Node Request Service and Executor Dispatch: node allocation with
//! per-node exclusive locks, and zoned build-request queues an
//! executor fleet claims work from.

mod error;
mod executor;
mod node_request;

pub use error::DispatchError;
pub use executor::{BuildRequest, BuildRequestState, ExecutorDispatch};
pub use node_request::{NodeRequest, NodeRequestService, RequestState};
