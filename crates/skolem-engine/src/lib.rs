//! Skolem evaluation engine.
//!
//! Evaluation is set-valued: every step yields a [`TermSet`] of alternatives,
//! possibly empty. The pieces, leaf-first:
//!
//! - [`scope`]: persistent variable environments (`name -> TermSet`)
//! - [`unify`]: binding-returning structural matching
//! - [`index`]: per-layer fact trie keyed by flattened slots
//! - [`world`]: stack of fact layers plus the shared resolution history
//! - [`guard`]: repeated-step detection bounding recursive resolution
//! - [`eval`]: substitution and evaluation of every term variant
//! - [`engine`]: the facade the REPL drives (`parse`/`eval`/`add`/`get_matches`)

pub mod engine;
pub mod eval;
pub mod guard;
pub mod index;
pub mod scope;
pub mod termset;
pub mod unify;
pub mod world;

pub use engine::{Engine, EngineError};
pub use eval::{eval, subst};
pub use guard::{CheckStep, StepGuard, StepHistory};
pub use index::FactIndex;
pub use scope::Scope;
pub use termset::TermSet;
pub use world::{Bindings, Match, World, WorldError};

pub use skolem_dsl::{Name, Term, TermKind};
