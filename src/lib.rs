//! Sitemend: scans connected sites for image SEO defects, meters AI
//! suggestion generation against a credit ledger, and applies revertible
//! alt-text fixes to the originating platform.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
