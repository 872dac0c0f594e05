//! Request/response types for the HTTP surface.

pub mod auth;
pub mod client;
pub mod invoice;
