pub mod credits;
pub mod entities;
pub mod error;
pub mod types;

pub use error::DomainError;
