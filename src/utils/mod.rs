//! Helpers shared across layers.
//!
//! - [`code_generator`] - Random short code generation and validation
//! - [`url_normalizer`] - Destination URL normalization
//! - [`client_meta`] - Visitor metadata from request headers

pub mod client_meta;
pub mod code_generator;
pub mod url_normalizer;
