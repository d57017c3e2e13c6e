//! The Gerrit driver: a [`GerritClient`] network boundary, the
//! dependency-resolution algorithm, and a [`GerritDriver`] tying both
//! to a [`railyard_cache::ChangeCache`].

mod client;
mod dependency;
mod driver;

pub use client::{GerritChangeData, GerritClient};
pub use dependency::{refresh, DEFAULT_MAX_DEPENDENCIES};
pub use driver::GerritDriver;
