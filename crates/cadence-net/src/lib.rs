//! TCP transport for Cadence.
//!
//! Implements the engine's transport port over persistent line-oriented TCP
//! connections: a listener accepts endpoints, each connection announces a
//! display name and registers for a monotonic identity, and the registry
//! routes outbound lines and inbound replies between connections and the
//! stages waiting on them.

mod connection;
pub mod registry;
pub mod server;
