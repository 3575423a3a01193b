//! REST API layer for HTTP request/response handling.
//!
//! A thin surface over the application services: handlers translate HTTP
//! requests into service calls and format the results.
//!
//! # Modules
//!
//! - [`dto`] - Data Transfer Objects for request/response serialization
//! - [`handlers`] - HTTP request handlers
//! - [`middleware`] - Request tracing
//! - [`routes`] - Route configuration

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;
