//! Structural matching with variable narrowing.
//!
//! Matching never mutates the scope it is given: a successful match returns
//! the scope extended with whatever it bound, and the caller decides which
//! scope to carry forward.

use skolem_dsl::{Term, TermKind};

use crate::scope::Scope;
use crate::termset::TermSet;

/// Matches `pattern` against `candidate` under `scope`.
///
/// - A reference already bound accepts the candidate only if its bound set
///   contains it (or contains `*`), and is then narrowed to `{candidate}`.
/// - An unbound reference binds to `{candidate}`.
/// - Applications match componentwise against applications.
/// - Everything else requires structural equality.
pub fn unify(pattern: &Term, candidate: &Term, scope: &Scope) -> Option<Scope> {
    match pattern.kind() {
        TermKind::Ref(name) => match scope.lookup(name) {
            Some(bound) => {
                if bound.as_single() == Some(candidate) {
                    Some(scope.clone())
                } else if bound.contains(candidate) || bound.contains_wildcard() {
                    Some(scope.bind(name.clone(), TermSet::single(candidate.clone())))
                } else {
                    None
                }
            }
            None => Some(scope.bind(name.clone(), TermSet::single(candidate.clone()))),
        },
        TermKind::Apply { pred, arg } => match candidate.kind() {
            TermKind::Apply {
                pred: other_pred,
                arg: other_arg,
            } => {
                let scope = unify(pred, other_pred, scope)?;
                unify(arg, other_arg, &scope)
            }
            _ => None,
        },
        _ => (pattern == candidate).then(|| scope.clone()),
    }
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

    #[test]
    fn unbound_reference_binds_candidate() {
        let scope = unify(&var("x"), &sym("a"), &Scope::empty()).expect("match");
        assert_eq!(scope.lookup("x"), Some(&TermSet::single(sym("a"))));
    }

    #[test]
    fn repeated_reference_must_agree() {
        let pattern = Term::apply_all(sym("P"), [var("x"), var("x")]);
        let same = Term::apply_all(sym("P"), [sym("a"), sym("a")]);
        let different = Term::apply_all(sym("P"), [sym("a"), sym("b")]);
        assert!(unify(&pattern, &same, &Scope::empty()).is_some());
        assert!(unify(&pattern, &different, &Scope::empty()).is_none());
    }

    #[test]
    fn bound_set_narrows_to_candidate() {
        let bound: TermSet = [sym("a"), sym("b")].into_iter().collect();
        let scope = Scope::empty().bind("x".into(), bound);
        let narrowed = unify(&var("x"), &sym("b"), &scope).expect("member");
        assert_eq!(narrowed.lookup("x"), Some(&TermSet::single(sym("b"))));
        assert!(unify(&var("x"), &sym("c"), &scope).is_none());
        // The caller's scope is untouched.
        assert_eq!(scope.lookup("x").map(TermSet::len), Some(2));
    }

    #[test]
    fn wildcard_binding_accepts_anything() {
        let scope = Scope::empty().bind("x".into(), TermSet::single(Term::wildcard()));
        let narrowed = unify(&var("x"), &sym("z"), &scope).expect("wildcard");
        assert_eq!(narrowed.lookup("x"), Some(&TermSet::single(sym("z"))));
    }

    #[test]
    fn constants_need_structural_equality() {
        assert!(unify(&sym("a"), &sym("a"), &Scope::empty()).is_some());
        assert!(unify(&sym("a"), &var("a"), &Scope::empty()).is_none());
        assert!(unify(&Term::apply(sym("P"), sym("a")), &sym("P"), &Scope::empty()).is_none());
    }
}
