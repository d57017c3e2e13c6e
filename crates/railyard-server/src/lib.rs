//! Daemon wiring for the pipeline scheduling core: loads an
//! already-parsed tenant layout, builds one
//! [`manager::PipelineManager`] per (tenant, pipeline), runs the
//! inbound event connector, and drives the whole thing to a clean
//! shutdown on Ctrl+C or an external cancel.
//!
//! Everything this crate can plug into — the coordination store, the
//! source driver — stays generic; concrete wiring (which
//! [`railyard_coord::CoordinationStore`], which
//! [`railyard_driver::SourceDriver`]) is `railyard-cli`'s job.

mod config;
mod connector;
mod daemon;
mod error;

pub use config::ServerConfig;
pub use connector::EventConnector;
pub use daemon::Daemon;
pub use error::ServerError;
