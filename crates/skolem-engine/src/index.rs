//! Per-layer fact index.
//!
//! Facts are keyed by the flattened slots of their head (`P a b` is keyed
//! `[P, a, b]`) in a trie. At every node, slots without free references live
//! in hash-keyed maps (`branches`/`leaves`) and are found by direct lookup
//! when the query slot is ground too; slots with free references live in
//! side lists (`quantified_*`) that always need an explicit match.
//!
//! Matching threads two scopes:
//! - `a`: bindings of the *query's* references, discovered against stored
//!   ground slots;
//! - `b`: bindings of the *stored fact's* references, discovered against the
//!   query.
//!
//! A candidate reached at a leaf is only accepted once it re-evaluates to a
//! non-empty set under `b` in its owning layer: a stored rule such as
//! `[R x] P x` is a fact about `P x` only while `R x` still holds. The
//! re-evaluated values are unified with the goal once more, which is how a
//! rule hands the values it derived back to the query's references.

use ahash::AHashMap;
use skolem_dsl::Term;
use tracing::{debug, trace};

use crate::eval::{eval, subst};
use crate::guard::CheckStep;
use crate::scope::Scope;
use crate::termset::TermSet;
use crate::unify::unify;
use crate::world::{singleton_bindings, Match, World};

#[derive(Default)]
pub struct FactIndex {
    root: Node,
    len: usize,
}

#[derive(Default)]
struct Node {
    branches: SlotMap<Node>,
    leaves: SlotMap<Vec<Term>>,
    quantified_branches: Vec<(Term, Node)>,
    quantified_leaves: Vec<(Term, Vec<Term>)>,
}

impl FactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `fact` with its enclosing lambda binders stripped (their
    /// parameters become the fact's free variables). Returns the stored term,
    /// or `None` when a structurally equal fact was already present.
    pub fn add(&mut self, fact: &Term) -> Option<Term> {
        let stored = fact.strip_binders();
        let slots = stored.head().flatten();
        if self.root.insert(&slots, &stored) {
            self.len += 1;
            Some(stored)
        } else {
            None
        }
    }

    /// Every stored fact, in insertion order per trie node.
    pub fn facts(&self) -> Vec<Term> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect(&mut out);
        out
    }

    /// Matches the flattened query `slots` (of `goal`) against this layer.
    pub(crate) fn collect_matches(
        &self,
        goal: &Term,
        slots: &[Term],
        layer: &World,
        out: &mut Vec<Match>,
    ) {
        let probe = Probe { goal, layer };
        self.root
            .walk(&probe, slots, &Scope::empty(), &Scope::empty(), out);
    }

    /// Linear scan matching `goal` against every stored fact as a whole.
    ///
    /// Used for a query that is a bare free reference, which has nothing to
    /// index on.
    pub(crate) fn collect_whole_value_matches(
        &self,
        goal: &Term,
        layer: &World,
        out: &mut Vec<Match>,
    ) {
        let probe = Probe { goal, layer };
        self.root.scan(&probe, out);
    }
}

impl Node {
    fn insert(&mut self, slots: &[Term], fact: &Term) -> bool {
        let Some((slot, rest)) = slots.split_first() else {
            return false;
        };
        if rest.is_empty() {
            let facts = if slot.is_ground() {
                self.leaves.get_or_default(slot)
            } else {
                quantified_entry(&mut self.quantified_leaves, slot)
            };
            if facts.contains(fact) {
                return false;
            }
            facts.push(fact.clone());
            true
        } else {
            let child = if slot.is_ground() {
                self.branches.get_or_default(slot)
            } else {
                quantified_entry(&mut self.quantified_branches, slot)
            };
            child.insert(rest, fact)
        }
    }

    fn walk(&self, probe: &Probe<'_>, slots: &[Term], a: &Scope, b: &Scope, out: &mut Vec<Match>) {
        let Some((slot, rest)) = slots.split_first() else {
            return;
        };
        let last = rest.is_empty();

        if slot.is_ground() {
            if last {
                if let Some(facts) = self.leaves.get(slot) {
                    probe.accept_all(facts, a, b, out);
                }
            } else if let Some(child) = self.branches.get(slot) {
                child.walk(probe, rest, a, b, out);
            }
        } else if last {
            for (key, facts) in self.leaves.iter() {
                if let Some(a) = unify(slot, key, a) {
                    probe.accept_all(facts, &a, b, out);
                }
            }
        } else {
            for (key, child) in self.branches.iter() {
                if let Some(a) = unify(slot, key, a) {
                    child.walk(probe, rest, &a, b, out);
                }
            }
        }

        if self.quantified_leaves.is_empty() && self.quantified_branches.is_empty() {
            return;
        }
        // Query references already bound by earlier slots are fixed here.
        for resolved in subst(slot, a) {
            if last {
                for (key, facts) in &self.quantified_leaves {
                    if let Some(b) = unify(key, &resolved, b) {
                        probe.accept_all(facts, a, &b, out);
                    }
                }
            } else {
                for (key, child) in &self.quantified_branches {
                    if let Some(b) = unify(key, &resolved, b) {
                        child.walk(probe, rest, a, &b, out);
                    }
                }
            }
        }
    }

    fn scan(&self, probe: &Probe<'_>, out: &mut Vec<Match>) {
        let leaves = self
            .leaves
            .values()
            .chain(self.quantified_leaves.iter().map(|(_, facts)| facts));
        for facts in leaves {
            for fact in facts {
                if let Some(a) = unify(probe.goal, fact, &Scope::empty()) {
                    probe.accept_all(std::slice::from_ref(fact), &a, &Scope::empty(), out);
                }
            }
        }

        let children = self
            .branches
            .values()
            .chain(self.quantified_branches.iter().map(|(_, child)| child));
        for child in children {
            child.scan(probe, out);
        }
    }

    fn collect(&self, out: &mut Vec<Term>) {
        for facts in self.leaves.values() {
            out.extend(facts.iter().cloned());
        }
        for (_, facts) in &self.quantified_leaves {
            out.extend(facts.iter().cloned());
        }
        for child in self.branches.values() {
            child.collect(out);
        }
        for (_, child) in &self.quantified_branches {
            child.collect(out);
        }
    }
}

/// Ground slots, hash-indexed but iterated in insertion order.
struct SlotMap<V> {
    entries: Vec<(Term, V)>,
    positions: AHashMap<Term, usize>,
}

impl<V> Default for SlotMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: AHashMap::new(),
        }
    }
}

impl<V: Default> SlotMap<V> {
    fn get(&self, key: &Term) -> Option<&V> {
        self.positions.get(key).map(|&i| &self.entries[i].1)
    }

    fn get_or_default(&mut self, key: &Term) -> &mut V {
        let next = self.entries.len();
        let pos = *self.positions.entry(key.clone()).or_insert(next);
        if pos == next {
            self.entries.push((key.clone(), V::default()));
        }
        &mut self.entries[pos].1
    }

    fn iter(&self) -> impl Iterator<Item = (&Term, &V)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }
}

fn quantified_entry<'a, T: Default>(list: &'a mut Vec<(Term, T)>, slot: &Term) -> &'a mut T {
    let pos = match list.iter().position(|(key, _)| key == slot) {
        Some(pos) => pos,
        None => {
            list.push((slot.clone(), T::default()));
            list.len() - 1
        }
    };
    &mut list[pos].1
}

/// One query against one layer.
struct Probe<'q> {
    goal: &'q Term,
    layer: &'q World,
}

impl Probe<'_> {
    fn accept_all(&self, facts: &[Term], a: &Scope, b: &Scope, out: &mut Vec<Match>) {
        let history = self.layer.history();
        let b = loosen(b);
        for fact in facts {
            let step = CheckStep::new(self.goal.clone(), fact.clone());
            if !history.is_legal(&step) {
                debug!(
                    goal = %self.goal,
                    fact = %fact,
                    depth = history.len(),
                    "cycle guard refused resolution step"
                );
                continue;
            }

            let resolved = {
                let _step = history.enter(step);
                eval(fact, &b, self.layer)
            };
            if resolved.is_empty() {
                trace!(goal = %self.goal, fact = %fact, "candidate fact no longer holds");
                continue;
            }

            let mut refined = false;
            let mut open = false;
            for value in &resolved {
                open |= !value.is_ground();
                if let Some(a) = unify(self.goal, value, a) {
                    refined = true;
                    out.push(Match {
                        fact: fact.clone(),
                        bindings: singleton_bindings(&a),
                    });
                }
            }
            // A value that still has free variables cannot be compared
            // with the goal; the walk that reached it stands in for that.
            if !refined && open {
                out.push(Match {
                    fact: fact.clone(),
                    bindings: singleton_bindings(a),
                });
            }
            if refined || open {
                trace!(goal = %self.goal, fact = %fact, "fact matched");
            }
        }
    }
}

/// Fact variables that the walk bound to open query terms are released, so
/// re-evaluating the fact can discover their values itself.
fn loosen(b: &Scope) -> Scope {
    let open: Vec<_> = b
        .squash()
        .into_iter()
        .filter(|(_, set)| set.iter().any(|t| !t.is_ground()))
        .map(|(name, _)| (name, TermSet::single(Term::wildcard())))
        .collect();
    b.extend(open)
}
