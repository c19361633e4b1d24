//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod account;
pub mod audit;
pub mod session;
