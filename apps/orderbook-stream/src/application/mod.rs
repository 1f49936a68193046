//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the services that run the subscription lifecycle
//! and book reconstruction, plus the port interfaces they depend on.

/// Port interfaces for the update source and the display collaborator.
pub mod ports;

/// Server-side streaming services and client-side reconciliation.
pub mod services;
