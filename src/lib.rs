//! This is the compiler as a library.  See `src/bin` directory for the
//! executable program using this library.
//!
//! The pipeline runs front to back: source text is lexed and parsed into an
//! AST ([front]), lowered into an IR of basic blocks ([middle]), and selected
//! into AArch64 machine code over virtual registers which a naive allocator
//! then rewrites to physical registers and stack slots ([back]).  Every stage
//! is a pure transformation that hands ownership of its output to the next.

pub mod common;
pub mod front;
pub mod middle;
pub mod back;
