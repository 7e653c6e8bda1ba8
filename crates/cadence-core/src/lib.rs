//! Workflow engine for Cadence.
//!
//! This crate defines the stage engine (time-bounded, reply-gated step
//! dispatch), stage chains with cross-stage reply propagation, the capability
//! hooks that customize a stage, and the transport "port" that the connection
//! layer implements. No sockets or IO crates here; the engine talks to the
//! outside world through the `Transport` trait alone.

pub mod chain;
pub mod hooks;
pub mod stage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
