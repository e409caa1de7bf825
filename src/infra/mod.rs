//! Infrastructure adapters: persistence, telemetry, outbound platforms, HTTP.

pub mod cms;
pub mod db;
pub mod error;
pub mod http;
pub mod telemetry;

pub use error::InfraError;
