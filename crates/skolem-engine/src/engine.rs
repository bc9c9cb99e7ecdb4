//! Top-level session: the scope built up by `:def` and the root fact layer.

use skolem_dsl::{parse_with, Name, ParseEnv, ParseError, Term, TermKind};
use thiserror::Error;
use tracing::debug;

use crate::eval::eval;
use crate::scope::Scope;
use crate::termset::TermSet;
use crate::world::{Match, World, WorldError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error("`{0}` cannot be defined: expected a plain symbol")]
    InvalidName(String),
}

#[derive(Default)]
pub struct Engine {
    scope: Scope,
    world: World,
    env: ParseEnv,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Names that currently parse as references.
    pub fn parse_env(&self) -> &ParseEnv {
        &self.env
    }

    pub fn parse(&self, text: &str) -> Result<Term, ParseError> {
        parse_with(text, &self.env)
    }

    pub fn eval(&self, term: &Term) -> TermSet {
        eval(term, &self.scope, &self.world)
    }

    pub fn evaluate(&self, text: &str) -> Result<TermSet, EngineError> {
        let term = self.parse(text)?;
        Ok(self.eval(&term))
    }

    /// Binds `name` to the evaluation of `text`. `name` itself is not in
    /// scope while `text` is parsed, so a definition never refers to itself;
    /// an earlier definition of the same name is shadowed.
    pub fn define(&mut self, name: &str, text: &str) -> Result<TermSet, EngineError> {
        let is_symbol = matches!(
            parse_with(name, &ParseEnv::new()).as_ref().map(Term::kind),
            Ok(TermKind::Sym(sym)) if &**sym == name
        );
        if !is_symbol {
            return Err(EngineError::InvalidName(name.to_string()));
        }

        let term = parse_with(text, &self.env.without(name))?;
        let values = self.eval(&term);
        debug!(name, values = %values, "definition bound");

        let name: Name = name.into();
        self.scope = self.scope.bind(name.clone(), values.clone());
        self.env = self.env.with(name);
        Ok(values)
    }

    /// Evaluates `text` and asserts every result into the root layer.
    pub fn declare(&self, text: &str) -> Result<TermSet, EngineError> {
        let term = self.parse(text)?;
        Ok(self.assert_term(&term)?)
    }

    pub fn assert_term(&self, term: &Term) -> Result<TermSet, WorldError> {
        let facts = self.eval(term);
        for fact in &facts {
            self.world.add(fact)?;
        }
        Ok(facts)
    }

    pub fn check(&self, text: &str) -> Result<bool, EngineError> {
        let term = self.parse(text)?;
        Ok(self.holds(&term))
    }

    /// Whether any evaluation result of `term` has a match among the facts.
    pub fn holds(&self, term: &Term) -> bool {
        self.eval(term)
            .iter()
            .any(|value| !self.world.get_matches(value).is_empty())
    }

    pub fn get_matches(&self, query: &Term) -> Vec<Match> {
        self.world.get_matches(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_atom_holds() {
        let engine = Engine::new();
        engine.declare("a").expect("declare");
        assert!(engine.check("a").expect("check"));
        assert!(!engine.check("b").expect("check"));
    }

    #[test]
    fn definitions_are_applied() {
        let mut engine = Engine::new();
        engine.define("id", "<x> x").expect("define");
        let out = engine.evaluate("id a").expect("evaluate");
        assert_eq!(out.to_string(), "{a}");
    }

    #[test]
    fn definition_does_not_see_itself() {
        let mut engine = Engine::new();
        engine.define("n", "z").expect("define");
        let out = engine.define("n", "s n").expect("redefine");
        // `n` on the right is the symbol, not the earlier definition.
        assert_eq!(out.to_string(), "{s n}");
        assert_eq!(engine.evaluate("n").expect("evaluate").to_string(), "{s n}");
    }

    #[test]
    fn definitions_reject_non_symbols() {
        let mut engine = Engine::new();
        assert!(matches!(
            engine.define("(a b)", "c"),
            Err(EngineError::InvalidName(_))
        ));
        assert!(matches!(
            engine.define("x", "(a"),
            Err(EngineError::Parse(_))
        ));
        assert!(!engine.parse_env().contains("x"));
    }

    #[test]
    fn declare_stores_every_result() {
        let mut engine = Engine::new();
        engine.define("s", "<x> x").expect("define");
        engine.declare("P a").expect("declare");
        engine.declare("P b").expect("declare");
        assert_eq!(engine.world().fact_count(), 2);
        let out = engine.evaluate("[P x] x").expect("evaluate");
        assert_eq!(out.len(), 2);
    }
}
