//! The middle-end of the compiler: the IR and the AST-to-IR lowering.

pub mod dump;
pub mod ir;
pub mod lower;

pub use dump::dump_ir;
pub use lower::{lower, LowerError};
