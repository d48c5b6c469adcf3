//! Shared domain types for the Inspecto project.

pub mod clock;
pub mod config;
pub mod gear;
pub mod lookup;
pub mod pixels;
pub mod record;

mod errors;

pub use errors::{InspectoError, Result};
