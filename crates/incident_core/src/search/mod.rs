//! Alert search index.
//!
//! # Responsibility
//! - Define the index client contract used by secondary index sync.
//! - Provide an SQLite FTS5 projection of alerts with a query side.
//!
//! The index is a derived, non-authoritative view; losing a write here never
//! invalidates the incident store.

pub mod fts;
