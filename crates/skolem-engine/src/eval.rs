//! Substitution and evaluation.
//!
//! Both are total: every term evaluates to a (possibly empty) [`TermSet`],
//! and "no result" is the empty set rather than an error.

use ahash::AHashSet;
use skolem_dsl::{Name, Term, TermKind};
use tracing::{debug, trace, warn};

use crate::scope::Scope;
use crate::termset::TermSet;
use crate::world::{Bindings, World};

/// Replaces effectively bound references in `term` with their bound sets.
///
/// A term none of whose free references is bound comes back as the same
/// handle, so lambdas keep their identity through substitution.
pub fn subst(term: &Term, scope: &Scope) -> TermSet {
    if untouched_by(term, scope) {
        return TermSet::single(term.clone());
    }

    match term.kind() {
        TermKind::Ref(name) => match scope.lookup(name) {
            Some(set) if !set.is_only_wildcard() => set.clone(),
            _ => TermSet::single(term.clone()),
        },
        TermKind::Lambda { param, body, .. } => {
            let inner = scope.shadow([param.clone()]);
            subst(body, &inner)
                .into_iter()
                .map(|body| Term::lambda(param.clone(), body))
                .collect()
        }
        TermKind::Apply { pred, arg } => cross(pred, arg, scope, Term::apply),
        TermKind::Declare { with, body } => cross(with, body, scope, Term::declare),
        TermKind::Constrain { constraint, body } => {
            cross(constraint, body, scope, Term::constrain)
        }
        TermKind::Sym(_) | TermKind::Wildcard | TermKind::Arbitrary | TermKind::Instance(_) => {
            TermSet::single(term.clone())
        }
    }
}

fn untouched_by(term: &Term, scope: &Scope) -> bool {
    scope.is_empty() || !term.free_refs().iter().any(|name| scope.binds_effectively(name))
}

fn cross(left: &Term, right: &Term, scope: &Scope, build: fn(Term, Term) -> Term) -> TermSet {
    let lefts = subst(left, scope);
    let rights = subst(right, scope);
    let mut out = TermSet::with_capacity(lefts.len() * rights.len());
    for l in &lefts {
        for r in &rights {
            out.insert(build(l.clone(), r.clone()));
        }
    }
    out
}

/// Evaluates `term` under `scope` against the facts visible from `world`.
pub fn eval(term: &Term, scope: &Scope, world: &World) -> TermSet {
    match term.kind() {
        TermKind::Arbitrary => TermSet::single(Term::fresh_instance()),
        TermKind::Apply { pred, arg } => eval_apply(pred, arg, scope, world),
        TermKind::Declare { .. } => eval_declare(term, scope, world),
        TermKind::Constrain { constraint, body } => eval_constrain(constraint, body, scope, world),
        TermKind::Sym(_)
        | TermKind::Wildcard
        | TermKind::Ref(_)
        | TermKind::Instance(_)
        | TermKind::Lambda { .. } => subst(term, scope),
    }
}

fn eval_apply(pred: &Term, arg: &Term, scope: &Scope, world: &World) -> TermSet {
    let preds = eval(pred, scope, world);
    if preds.is_empty() {
        return TermSet::new();
    }
    let args = eval(arg, scope, world);

    let mut out = TermSet::new();
    for p in &preds {
        match p.kind() {
            // The parameter is bound to every argument at once, even to none.
            TermKind::Lambda { param, body, .. } => {
                let inner = scope.bind(param.clone(), args.clone());
                out.extend(eval(body, &inner, world));
            }
            _ => {
                for a in &args {
                    out.insert(Term::apply(p.clone(), a.clone()));
                }
            }
        }
    }
    out
}

fn eval_declare(term: &Term, scope: &Scope, world: &World) -> TermSet {
    let layer = world.child();
    let mut current = term;
    while let TermKind::Declare { with, body } = current.kind() {
        for fact in eval(with, scope, &layer) {
            if let Err(err) = layer.add(&fact) {
                warn!(fact = %fact, error = %err, "dropping declared fact");
            }
        }
        current = body;
    }

    debug!(
        depth = layer.depth(),
        facts = layer.fact_count(),
        "evaluating under declared facts"
    );
    eval(current, scope, &layer)
}

fn eval_constrain(constraint: &Term, body: &Term, scope: &Scope, world: &World) -> TermSet {
    let free = constraint.free_refs();
    if free.is_empty() {
        let holds = eval(constraint, scope, world)
            .iter()
            .any(|value| !world.get_matches(value).is_empty());
        return if holds {
            eval(body, scope, world)
        } else {
            TermSet::new()
        };
    }

    let mut bound: Vec<(Name, Vec<Term>)> = Vec::new();
    let mut unbound: Vec<&Name> = Vec::new();
    for name in free {
        match scope.lookup(name) {
            Some(set) if !set.is_only_wildcard() => {
                if set.is_empty() {
                    return TermSet::new();
                }
                bound.push((name.clone(), set.iter().cloned().collect()));
            }
            _ => unbound.push(name),
        }
    }

    let radices: Vec<usize> = bound.iter().map(|(_, values)| values.len()).collect();
    let mut digits = vec![0; bound.len()];
    let mut out = TermSet::new();
    loop {
        let combination = scope.extend(
            bound
                .iter()
                .zip(&digits)
                .map(|((name, values), &i)| (name.clone(), TermSet::single(values[i].clone()))),
        );
        out.extend(solve(constraint, body, &unbound, &combination, world));

        if !advance(&mut digits, &radices) {
            return out;
        }
    }
}

/// Evaluates `body` once per distinct set of bindings that the matches of
/// `constraint` give the `unbound` references.
fn solve(
    constraint: &Term,
    body: &Term,
    unbound: &[&Name],
    scope: &Scope,
    world: &World,
) -> TermSet {
    let mut out = TermSet::new();
    let mut seen: AHashSet<Bindings> = AHashSet::new();
    let mut evaluated_plain = false;

    for value in eval(constraint, scope, world) {
        for found in world.get_matches(&value) {
            let extra: Bindings = found
                .bindings
                .into_iter()
                .filter(|(name, _)| unbound.contains(&name))
                .collect();

            if extra.is_empty() {
                if !evaluated_plain {
                    evaluated_plain = true;
                    out.extend(eval(body, scope, world));
                }
                continue;
            }
            if !seen.insert(extra.clone()) {
                continue;
            }
            trace!(constraint = %value, bindings = ?extra, "constraint satisfied");
            let inner = scope.extend(
                extra
                    .into_iter()
                    .map(|(name, term)| (name, TermSet::single(term))),
            );
            out.extend(eval(body, &inner, world));
        }
    }
    out
}

/// Steps a little-endian odometer; false once it wraps around.
fn advance(digits: &mut [usize], radices: &[usize]) -> bool {
    for (digit, &radix) in digits.iter_mut().zip(radices) {
        *digit += 1;
        if *digit < radix {
            return true;
        }
        *digit = 0;
    }
    false
}
