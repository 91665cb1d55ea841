//! Shared types for the assistant façade

pub mod error;

pub use error::*;
