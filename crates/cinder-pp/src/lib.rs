//! cinder-pp - The C Preprocessor
//!
//! This crate turns a C source file into a stream of language tokens ready
//! for syntactic analysis. The pipeline is the classic one:
//!
//! ```text
//! bytes ──▶ [pp-lexer] ──▶ pp-tokens ──▶ [token iterator]
//!                                             │
//!                     ┌───────────────────────┤
//!                     ▼                       ▼
//!              [directives]            [macro expander]
//!          (#define #include           (object, function,
//!           #if … #pragma)              builtin; rescan)
//!                     │                       │
//!                     └───────────┬───────────┘
//!                                 ▼
//!                          [converter] ──▶ language tokens
//! ```
//!
//! The [`Preprocessor`] session owns every piece of state: the file store
//! (contents live in a caller-owned [`bumpalo::Bump`]), the stacked token
//! iterator, the macro table, and the conditional-inclusion stack. There
//! are no process-wide globals; sessions with disjoint arenas can run on
//! different threads.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use cinder_util::Handler;
//! use cinder_pp::Preprocessor;
//!
//! let arena = Bump::new();
//! let handler = Handler::new();
//! let mut pp = Preprocessor::new(&arena, &handler);
//! let tokens = pp.preprocess_source("demo.c", "#define N 42\nint x = N;");
//! assert!(!handler.has_errors());
//! assert_eq!(tokens.len(), 5); // int x = 42 ;
//! ```

pub mod cond;
pub mod convert;
pub mod expand;
pub mod expr;
pub mod files;
pub mod iter;
pub mod lexer;
pub mod macros;
pub mod pp;
pub mod token;

pub use convert::{CKeyword, CToken, CTokenKind, FloatSuffix, IntSuffix};
pub use files::{FileId, FileStore, IncludeStyle, SourceFile};
pub use lexer::PpLexer;
pub use macros::{Builtin, Macro, MacroKind, MacroTable};
pub use pp::Preprocessor;
pub use token::{print_tokens, PpToken, PpTokenKind, Punct, StrEnc};
