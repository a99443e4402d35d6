//! cinder-util - Core Utilities and Foundation Types
//!
//! This crate provides the foundation shared by every phase of the Cinder
//! toolchain: interned strings, source locations, and diagnostic collection.
//! These types are deliberately small and cheap to copy; everything that is
//! per-session (file contents, macro tables, token lists) lives in the phase
//! crates that own the session.
//!
//! - [`Symbol`]: a 4-byte handle to a deduplicated immutable string.
//! - [`Span`]: a source location (file name, line, column, byte offset).
//! - [`Handler`] / [`Diagnostic`]: location-annotated error and warning
//!   records, collected during a run and rendered by the driver.

pub mod diag;
pub mod span;
pub mod symbol;

pub use diag::{Diagnostic, Fatal, Handler, Level};
pub use span::Span;
pub use symbol::{sym, Symbol};

// Re-export the hash map types every phase crate uses.
pub use rustc_hash::{FxHashMap, FxHashSet};
