//! Shared wire types, configuration, and error taxonomy for the
//! coordination core (`swarm-core`) and its server (`swarm-server`).

pub mod config;
pub mod error;
pub mod types;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
