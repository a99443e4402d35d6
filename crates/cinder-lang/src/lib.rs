//! cinder-lang - The Cinder Language Front-End
//!
//! A small, self-contained pipeline sharing the `cinder-util` substrate:
//! tokenizer, recursive-descent parser with twelve precedence tiers, a
//! tagged-enum AST, and a bytecode builder that collects static variables
//! and a function table and emits the bytecode header.
//!
//! ```text
//! source ──▶ [Lexer] ──▶ tokens ──▶ [Parser] ──▶ Program
//!                                                   │
//!                                          [BytecodeBuilder]
//!                                                   │
//!                                                   ▼
//!                                          header ──▶ .bc file
//! ```
//!
//! # Example
//!
//! ```
//! use cinder_lang::{BytecodeBuilder, Lexer, Parser};
//! use cinder_util::{Handler, Symbol};
//!
//! let handler = Handler::new();
//! let tokens = Lexer::new("answer := 42;", Symbol::intern("demo.cn"), &handler).tokenize();
//! let program = Parser::new(tokens, &handler).parse_program();
//! let mut builder = BytecodeBuilder::new(&handler);
//! builder.process(&program);
//! assert!(!handler.has_errors());
//! assert_eq!(builder.statics().len(), 1);
//! ```

pub mod ast;
pub mod builder;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Block, Expr, FuncDecl, Item, Program, Stmt, TypeName, VarDecl};
pub use builder::{BytecodeBuilder, FunctionRecord, StaticVar, ValueType};
pub use builder::{BYTECODE_MAGIC, BYTECODE_VERSION, COMPILER_VERSION};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;
