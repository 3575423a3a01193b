//! Application layer: services and background job handling.
//!
//! Services consume the repository trait and the cache layer and expose the
//! operations the HTTP layer and the job workers call.
//!
//! # Available Services
//!
//! - [`services::LinkService`] - Link creation, cache-aside lookups and aggregates
//! - [`services::ClickService`] - Pending counters and their reconciliation
//! - [`services::SlugPool`] - Pre-generated code pool
//! - [`services::ExpiryReaper`] - Removal of expired links
//!
//! [`jobs`] routes queued payloads to these services and schedules the
//! periodic ones.

pub mod jobs;
pub mod services;
