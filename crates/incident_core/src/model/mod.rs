//! Domain model for incidents, alerts and change signals.
//!
//! # Responsibility
//! - Define the records owned by the authoritative store.
//! - Define the ephemeral values emitted after a successful mutation.
//!
//! # Invariants
//! - Every incident and alert is scoped to exactly one tenant.
//! - Ephemeral values carry owned snapshots, never references into storage.

pub mod alert;
pub mod event;
pub mod incident;
