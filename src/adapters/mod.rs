//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the transport surfaces around the usecases layer with
//! concrete external dependencies (HTTP server, HTTP client, process
//! probes). Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `http`: axum scrape + liveness/readiness endpoints
//! - `probes`: process-local self-check probe
//! - `push`: optional remote-write forwarder

pub mod http;
pub mod probes;
pub mod push;
