//! Data loading
//!
//! This module reads labelled training/test sets and unlabelled query
//! vectors from CSV files.

pub mod csv;

pub use self::csv::*;
