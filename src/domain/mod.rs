//! Domain layer containing business entities and contracts.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Durable store contract
//! - [`click_event`] - Click event model
//! - [`jobs`] - Background job model (tagged payload union, queue names)
//!
//! # Click Processing Flow
//!
//! 1. The redirect handler resolves a code through the cache-aside lookup
//! 2. A [`click_event::ClickEvent`] is enqueued as a high-priority job
//! 3. A click worker increments the pending counter in the cache
//! 4. Once the flush rule fires, the delta is written to the durable store

pub mod click_event;
pub mod entities;
pub mod jobs;
pub mod repositories;
