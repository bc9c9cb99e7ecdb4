//! Layered fact database.
//!
//! A [`World`] is a handle to one layer of facts plus its ancestors. Queries
//! see every layer from the innermost outwards and accumulate all matches;
//! layers never hide each other's facts. `{with} body` evaluates `body` in a
//! child layer that is dropped with the last handle to it.
//!
//! All layers of one chain share a single [`StepHistory`], so the cycle guard
//! sees resolution steps taken anywhere in the chain.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use skolem_dsl::{Name, Term};
use thiserror::Error;
use tracing::debug;

use crate::guard::StepHistory;
use crate::index::FactIndex;
use crate::scope::Scope;

/// Query-side bindings produced by a match.
pub type Bindings = BTreeMap<Name, Term>;

#[derive(Debug, Clone)]
pub struct Match {
    /// The stored fact that matched.
    pub fact: Term,
    /// References of the query bound while matching.
    pub bindings: Bindings,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("fact layer at depth {depth} is being queried and cannot accept facts")]
    LayerBusy { depth: usize },
}

#[derive(Clone)]
pub struct World(Rc<Layer>);

struct Layer {
    facts: RefCell<FactIndex>,
    parent: Option<World>,
    history: StepHistory,
    depth: usize,
}

impl Default for World {
    fn default() -> Self {
        World::root()
    }
}

impl World {
    pub fn root() -> Self {
        World(Rc::new(Layer {
            facts: RefCell::new(FactIndex::new()),
            parent: None,
            history: StepHistory::new(),
            depth: 0,
        }))
    }

    /// An empty layer on top of `self`.
    pub fn child(&self) -> Self {
        World(Rc::new(Layer {
            facts: RefCell::new(FactIndex::new()),
            parent: Some(self.clone()),
            history: self.0.history.clone(),
            depth: self.0.depth + 1,
        }))
    }

    pub fn parent(&self) -> Option<&World> {
        self.0.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn history(&self) -> &StepHistory {
        &self.0.history
    }

    /// This layer, then each ancestor.
    pub fn layers(&self) -> impl Iterator<Item = &World> {
        std::iter::successors(Some(self), |w| w.parent())
    }

    /// Asserts `fact` into this layer only. Returns false when an equal fact
    /// was already stored here.
    pub fn add(&self, fact: &Term) -> Result<bool, WorldError> {
        let mut facts = self
            .0
            .facts
            .try_borrow_mut()
            .map_err(|_| WorldError::LayerBusy {
                depth: self.0.depth,
            })?;
        let stored = facts.add(fact);
        if let Some(stored) = &stored {
            debug!(depth = self.0.depth, fact = %stored, "fact added");
        }
        Ok(stored.is_some())
    }

    /// Facts stored in this layer.
    pub fn fact_count(&self) -> usize {
        self.0.facts.borrow().len()
    }

    /// Facts visible from this layer.
    pub fn visible_fact_count(&self) -> usize {
        self.layers().map(World::fact_count).sum()
    }

    /// Facts stored in this layer, in index order.
    pub fn facts(&self) -> Vec<Term> {
        self.0.facts.borrow().facts()
    }

    /// Every fact in this layer or an ancestor that matches `query`.
    pub fn get_matches(&self, query: &Term) -> Vec<Match> {
        let mut out = Vec::new();
        let slots = query.flatten();
        let bare_ref = query.ref_name().is_some();

        for layer in self.layers() {
            let facts = layer.0.facts.borrow();
            if bare_ref {
                facts.collect_whole_value_matches(query, layer, &mut out);
                continue;
            }
            facts.collect_matches(query, &slots, layer, &mut out);
            if slots.len() > 1 {
                // Facts stored under a single whole-term slot, e.g. a bare
                // quantified relation variable.
                facts.collect_matches(query, std::slice::from_ref(query), layer, &mut out);
            }
        }
        out
    }
}

/// Bindings of `scope` that narrowed to exactly one term.
pub(crate) fn singleton_bindings(scope: &Scope) -> Bindings {
    scope
        .squash()
        .into_iter()
        .filter_map(|(name, set)| set.as_single().cloned().map(|t| (name, t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(n: &str) -> Term {
        Term::sym(n)
    }

    fn var(n: &str) -> Term {
        Term::reference(n)
    }

    fn rel(pred: &str, args: &[Term]) -> Term {
        Term::apply_all(sym(pred), args.iter().cloned())
    }

    #[test]
    fn ground_query_matches_ground_fact() {
        let world = World::root();
        world.add(&rel("P", &[sym("a")])).expect("add");
        assert_eq!(world.get_matches(&rel("P", &[sym("a")])).len(), 1);
        assert!(world.get_matches(&rel("P", &[sym("b")])).is_empty());
        assert!(world.get_matches(&sym("P")).is_empty());
    }

    #[test]
    fn query_reference_binds_against_ground_facts() {
        let world = World::root();
        world.add(&rel("P", &[sym("a")])).expect("add");
        world.add(&rel("P", &[sym("b")])).expect("add");
        world.add(&rel("Q", &[sym("c")])).expect("add");

        let matches = world.get_matches(&rel("P", &[var("x")]));
        let bound: Vec<String> = matches
            .iter()
            .map(|m| m.bindings.get("x").expect("x bound").to_string())
            .collect();
        assert_eq!(bound, vec!["a", "b"]);
    }

    #[test]
    fn quantified_fact_matches_any_argument() {
        let world = World::root();
        world
            .add(&Term::lambda("x", rel("Q", &[var("x")])))
            .expect("add");
        let matches = world.get_matches(&rel("Q", &[sym("anything")]));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].bindings.is_empty());
    }

    #[test]
    fn child_layers_add_to_parent_facts() {
        let root = World::root();
        root.add(&rel("P", &[sym("a")])).expect("add");
        let child = root.child();
        child.add(&rel("P", &[sym("b")])).expect("add");

        assert_eq!(child.get_matches(&rel("P", &[var("x")])).len(), 2);
        assert_eq!(root.get_matches(&rel("P", &[var("x")])).len(), 1);
        assert_eq!(child.visible_fact_count(), 2);
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn bare_reference_scans_every_fact() {
        let world = World::root();
        world.add(&sym("a")).expect("add");
        world.add(&rel("P", &[sym("b")])).expect("add");
        world
            .add(&Term::lambda("y", rel("P", &[var("y")])))
            .expect("add");

        let found: Vec<String> = world
            .get_matches(&var("x"))
            .iter()
            .map(|m| m.bindings["x"].to_string())
            .collect();
        assert_eq!(found, vec!["a", "P b", "P y"]);
    }

    #[test]
    fn bare_quantified_fact_matches_whole_query() {
        let world = World::root();
        world.add(&Term::lambda("f", var("f"))).expect("add");
        assert_eq!(world.get_matches(&rel("P", &[sym("a")])).len(), 1);
    }

    #[test]
    fn adding_to_a_layer_under_query_is_refused() {
        let root = World::root();
        let layer = root.child();

        let walking = layer.0.facts.borrow();
        let err = layer.add(&sym("a")).expect_err("layer is borrowed");
        assert!(matches!(err, WorldError::LayerBusy { depth: 1 }));
        assert!(root.add(&sym("b")).expect("root is free"));
        drop(walking);

        assert!(layer.add(&sym("a")).expect("add"));
        assert_eq!(layer.visible_fact_count(), 2);
    }
}
