//! PostgreSQL repository implementations.
//!
//! Concrete implementations of domain repository traits using SQLx with
//! bound parameters. The schema lives in `migrations/`.
//!
//! # Repositories
//!
//! - [`PgLinkRepository`] - Short link storage, click counts and expiry queries

pub mod pg_link_repository;

pub use pg_link_repository::PgLinkRepository;
