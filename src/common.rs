//! Common definitions that are shared between different parts of the compiler.

use derive_more::Display;

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers.
pub type Id = internment::Intern<String>;

/// Intern a string as an [Id].
pub fn id(name: &str) -> Id {
    Id::from_ref(name)
}

/// A single user-facing error message with its source location.
///
/// The parser collects these instead of failing; the driver prints them to
/// stderr as `<path>:<row>:<col>: <message>` lines.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[display("{path}:{row}:{col}: {message}")]
pub struct Diagnostic {
    /// Path of the source file the message refers to.
    pub path: String,
    /// 1-based line of the offending token.
    pub row: u32,
    /// 1-based column of the offending token's first character.
    pub col: u32,
    pub message: String,
}
