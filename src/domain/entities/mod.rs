//! Core domain entities.
//!
//! - [`ShortLink`] - A short code mapped to a destination, as persisted
//! - [`NewShortLink`] - Input for creating a link
//! - [`LinkView`] - A link plus its not-yet-flushed clicks
//! - [`LookupOutcome`] - Result of resolving a code
//! - [`SystemStats`] - Totals for the stats aggregate

pub mod link;

pub use link::{LinkView, LookupOutcome, NewShortLink, ShortLink, SystemStats};
