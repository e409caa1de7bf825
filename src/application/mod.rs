//! Application services over the repository seams.

pub mod credits;
pub mod error;
pub mod fixes;
pub mod jobs;
pub mod optimizer;
pub mod repos;
pub mod scanner;
pub mod summary;
pub mod webhooks;

pub use error::AppError;
