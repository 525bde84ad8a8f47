//! Kernel functions and kernel matrix construction

pub mod linear;
pub mod matrix;
pub mod quantum;
pub mod rbf;
pub mod spec;
pub mod traits;

pub use self::linear::*;
pub use self::matrix::*;
pub use self::quantum::*;
pub use self::rbf::*;
pub use self::spec::*;
pub use self::traits::*;
