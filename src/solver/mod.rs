//! Dual QP solver for binary soft-margin SVMs
//!
//! This module implements Sequential Minimal Optimization (SMO) over a
//! precomputed kernel matrix, with first- or second-order working set
//! selection as described by Fan, Chen and Lin (2005).

pub mod smo;

pub use self::smo::*;
