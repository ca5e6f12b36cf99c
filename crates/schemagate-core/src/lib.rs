pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod migrations;
pub mod plan;
pub mod reconcile;
pub mod revision;
pub mod state;
pub mod store;

pub use error::{GateError, Result};
