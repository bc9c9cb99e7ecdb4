//! Skolem term language: term model and surface syntax.
//!
//! This crate owns the immutable term representation shared by the engine and
//! the REPL, the process-wide identity allocator used for lambdas and
//! skolem constants, and the recursive-descent reader for the surface grammar:
//!
//! - `name`        symbol (or reference, when bound)
//! - `f x y`       left-associative application
//! - `<x> body`    lambda
//! - `[c] body`    constrain (query)
//! - `{f} body`    declare (scoped facts)
//! - `*`, `?`      wildcard, arbitrary

pub mod ids;
pub mod parser;
pub mod term;

pub use ids::{ArbitraryId, IdAllocator, LambdaId};
pub use parser::{parse, parse_with, ParseEnv, ParseError};
pub use term::{Name, Term, TermKind};
