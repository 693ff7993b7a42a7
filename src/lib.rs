pub mod artifact;
pub mod coerce;
pub mod config;
pub mod constants;
pub mod error;
pub mod manifest;
pub mod observability;
pub mod pipeline;
pub mod raw;
pub mod table;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
