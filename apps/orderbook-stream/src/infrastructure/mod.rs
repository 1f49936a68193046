//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the ambient service plumbing.

/// gRPC transport: proto codegen, converters, server, and client.
pub mod grpc;

/// Fixture-backed book source used by the server binary.
pub mod simulator;

/// Console renderer for reconstructed books.
pub mod display;

/// Environment-driven configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
