//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the authoritative store contract used by the coordinator.
//! - Isolate SQLite query details from orchestration.
//!
//! # Invariants
//! - Repository writes enforce `Incident::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod incident_repo;
