//! Core types and errors for kernel classification

pub mod error;
pub mod types;

pub use self::error::*;
pub use self::types::*;
