//! Source Driver abstraction and dependency resolution: the
//! [`SourceDriver`] trait any review-system connector implements, plus
//! a Gerrit implementation built on top of it.

mod error;
mod gerrit;
mod source_driver;

pub use error::DriverError;
pub use gerrit::{GerritChangeData, GerritClient, GerritDriver, DEFAULT_MAX_DEPENDENCIES};
pub use source_driver::SourceDriver;
