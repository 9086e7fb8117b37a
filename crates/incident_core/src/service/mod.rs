//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate one authoritative mutation plus its downstream fan-out.
//! - Keep calling layers decoupled from storage and collaborator details.

pub mod incident_service;
pub mod isolate;
pub mod summary;
