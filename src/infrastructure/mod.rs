//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for data persistence, caching and job queues.
//!
//! # Modules
//!
//! - [`cache`] - Cache backends (Redis, in-memory, no-op) behind a fail-open layer
//! - [`persistence`] - PostgreSQL repository implementations
//! - [`queue`] - In-process named job queues with retry and worker pools

pub mod cache;
pub mod persistence;
pub mod queue;
