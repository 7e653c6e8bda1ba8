//! Shared domain types for Cadence.
//!
//! This crate contains the core domain types used across the Cadence
//! workspace: endpoint identities, replies, steps, campaign definitions,
//! and server configuration.
//!
//! Zero infrastructure dependencies -- serde is the only import.

pub mod campaign;
pub mod config;
pub mod endpoint;
pub mod reply;
pub mod step;
