//! Request and response types for the REST API.

pub mod user;

pub use user::*;
