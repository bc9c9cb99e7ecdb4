//! Variable environments.
//!
//! A [`Scope`] is a persistent chain of frames. Extending a scope allocates a
//! new frame pointing at the old one, so a scope handed to a callee can never
//! be invalidated or mutated behind the caller's back. A frame may also
//! *shadow* names, hiding any binding further up the chain (substitution
//! under a lambda shadows the lambda's own parameter).

use std::collections::BTreeMap;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use skolem_dsl::Name;

use crate::termset::TermSet;

#[derive(Clone, Default)]
pub struct Scope {
    frame: Option<Rc<Frame>>,
}

struct Frame {
    bindings: AHashMap<Name, TermSet>,
    shadowed: AHashSet<Name>,
    parent: Scope,
}

impl Scope {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    fn push(&self, bindings: AHashMap<Name, TermSet>, shadowed: AHashSet<Name>) -> Scope {
        Scope {
            frame: Some(Rc::new(Frame {
                bindings,
                shadowed,
                parent: self.clone(),
            })),
        }
    }

    /// `self` plus one binding.
    pub fn bind(&self, name: Name, set: TermSet) -> Scope {
        let mut bindings = AHashMap::with_capacity(1);
        bindings.insert(name, set);
        self.push(bindings, AHashSet::new())
    }

    /// `self` plus several bindings in one frame. Returns `self` unchanged
    /// when there is nothing to add.
    pub fn extend(&self, bindings: impl IntoIterator<Item = (Name, TermSet)>) -> Scope {
        let bindings: AHashMap<Name, TermSet> = bindings.into_iter().collect();
        if bindings.is_empty() {
            return self.clone();
        }
        self.push(bindings, AHashSet::new())
    }

    /// `self` with `names` hidden from lookups.
    pub fn shadow(&self, names: impl IntoIterator<Item = Name>) -> Scope {
        self.push(AHashMap::new(), names.into_iter().collect())
    }

    pub fn lookup(&self, name: &str) -> Option<&TermSet> {
        let mut current = self.frame.as_deref();
        while let Some(frame) = current {
            if let Some(set) = frame.bindings.get(name) {
                return Some(set);
            }
            if frame.shadowed.contains(name) {
                return None;
            }
            current = frame.parent.frame.as_deref();
        }
        None
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Bound to something other than exactly `{*}`.
    pub fn binds_effectively(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|set| !set.is_only_wildcard())
    }

    /// Every visible binding, innermost frames winning.
    pub fn squash(&self) -> BTreeMap<Name, TermSet> {
        let mut frames = Vec::new();
        let mut current = self.frame.as_deref();
        while let Some(frame) = current {
            frames.push(frame);
            current = frame.parent.frame.as_deref();
        }

        let mut out = BTreeMap::new();
        for frame in frames.into_iter().rev() {
            for name in &frame.shadowed {
                out.remove(name);
            }
            for (name, set) in &frame.bindings {
                out.insert(name.clone(), set.clone());
            }
        }
        out
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.squash()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skolem_dsl::Term;

    fn set(names: &[&str]) -> TermSet {
        names.iter().map(|n| Term::sym(*n)).collect()
    }

    #[test]
    fn inner_bindings_shadow_outer() {
        let outer = Scope::empty().bind("x".into(), set(&["a"]));
        let inner = outer.bind("x".into(), set(&["b", "c"]));
        assert_eq!(inner.lookup("x"), Some(&set(&["b", "c"])));
        assert_eq!(outer.lookup("x"), Some(&set(&["a"])));
        assert!(!inner.has("y"));
    }

    #[test]
    fn shadow_blocks_parent_bindings() {
        let outer = Scope::empty().extend([("x".into(), set(&["a"])), ("y".into(), set(&["b"]))]);
        let shadowed = outer.shadow(["x".into()]);
        assert!(!shadowed.has("x"));
        assert!(shadowed.has("y"));

        let rebound = shadowed.bind("x".into(), set(&["c"]));
        assert_eq!(rebound.lookup("x"), Some(&set(&["c"])));

        let squashed = shadowed.squash();
        assert!(!squashed.contains_key("x"));
        assert_eq!(squashed.get("y"), Some(&set(&["b"])));
    }

    #[test]
    fn wildcard_binding_is_not_effective() {
        let scope = Scope::empty()
            .bind("x".into(), TermSet::single(Term::wildcard()))
            .bind("y".into(), TermSet::new());
        assert!(scope.has("x"));
        assert!(!scope.binds_effectively("x"));
        assert!(scope.binds_effectively("y"));
    }

    #[test]
    fn empty_extension_reuses_scope() {
        let scope = Scope::empty();
        assert!(scope.extend(Vec::new()).is_empty());
    }
}
