//! Term model.
//!
//! Terms are immutable and shared: a [`Term`] is a reference-counted handle to
//! a node that is never mutated after construction. Substitution and
//! evaluation build new nodes (and return the *same* handle when nothing
//! changes), so handle identity is meaningful:
//!
//! - `PartialEq`/`Hash` are structural, except lambdas and arbitrary
//!   instances, which compare by their allocated id.
//! - [`Term::same`] is object identity, used where the engine needs to know
//!   that two occurrences are the very same stored fact.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ids::{ArbitraryId, IdAllocator, LambdaId};

pub type Name = Rc<str>;

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug)]
pub enum TermKind {
    /// Atomic constant, equal by name.
    Sym(Name),
    /// `*`: inside a bound set it means "matches anything".
    Wildcard,
    /// Logic variable occurrence.
    Ref(Name),
    /// `?`: mints a fresh [`TermKind::Instance`] every time it is evaluated.
    Arbitrary,
    /// Skolem constant produced by evaluating `?`.
    Instance(ArbitraryId),
    Lambda {
        param: Name,
        body: Term,
        id: LambdaId,
    },
    Apply {
        pred: Term,
        arg: Term,
    },
    /// `{with} body`: the results of `with` are facts while `body` evaluates.
    Declare {
        with: Term,
        body: Term,
    },
    /// `[constraint] body`: `body` once per binding satisfying `constraint`.
    Constrain {
        constraint: Term,
        body: Term,
    },
}

struct Node {
    kind: TermKind,
    hash: u64,
    free_refs: OnceCell<BTreeSet<Name>>,
}

#[derive(Clone)]
pub struct Term(Rc<Node>);

thread_local! {
    static WILDCARD: Term = Term::new(TermKind::Wildcard);
    static ARBITRARY: Term = Term::new(TermKind::Arbitrary);
}

impl Term {
    fn new(kind: TermKind) -> Self {
        let hash = structural_hash(&kind);
        Term(Rc::new(Node {
            kind,
            hash,
            free_refs: OnceCell::new(),
        }))
    }

    pub fn sym(name: impl Into<Name>) -> Self {
        Term::new(TermKind::Sym(name.into()))
    }

    pub fn reference(name: impl Into<Name>) -> Self {
        Term::new(TermKind::Ref(name.into()))
    }

    pub fn wildcard() -> Self {
        WILDCARD.with(Term::clone)
    }

    pub fn arbitrary() -> Self {
        ARBITRARY.with(Term::clone)
    }

    /// A brand-new skolem constant, never equal to any previous one.
    pub fn fresh_instance() -> Self {
        Term::new(TermKind::Instance(IdAllocator::global().next_instance()))
    }

    /// A lambda with a freshly allocated identity.
    pub fn lambda(param: impl Into<Name>, body: Term) -> Self {
        Term::new(TermKind::Lambda {
            param: param.into(),
            body,
            id: IdAllocator::global().next_lambda(),
        })
    }

    pub fn apply(pred: Term, arg: Term) -> Self {
        Term::new(TermKind::Apply { pred, arg })
    }

    /// `pred a1 a2 ...`, left-associated.
    pub fn apply_all(pred: Term, args: impl IntoIterator<Item = Term>) -> Self {
        args.into_iter().fold(pred, Term::apply)
    }

    pub fn declare(with: Term, body: Term) -> Self {
        Term::new(TermKind::Declare { with, body })
    }

    pub fn constrain(constraint: Term, body: Term) -> Self {
        Term::new(TermKind::Constrain { constraint, body })
    }

    pub fn kind(&self) -> &TermKind {
        &self.0.kind
    }

    /// Object identity.
    pub fn same(a: &Term, b: &Term) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind(), TermKind::Wildcard)
    }

    pub fn ref_name(&self) -> Option<&Name> {
        match self.kind() {
            TermKind::Ref(name) => Some(name),
            _ => None,
        }
    }

    /// True for variants printed without parentheses in any position.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind(),
            TermKind::Sym(_)
                | TermKind::Wildcard
                | TermKind::Ref(_)
                | TermKind::Arbitrary
                | TermKind::Instance(_)
        )
    }

    /// Names referenced but not bound inside this term. Computed once per node.
    pub fn free_refs(&self) -> &BTreeSet<Name> {
        self.0.free_refs.get_or_init(|| {
            let mut out = BTreeSet::new();
            match self.kind() {
                TermKind::Ref(name) => {
                    out.insert(name.clone());
                }
                TermKind::Lambda { param, body, .. } => {
                    out.extend(body.free_refs().iter().filter(|n| *n != param).cloned());
                }
                TermKind::Apply { pred: a, arg: b }
                | TermKind::Declare { with: a, body: b }
                | TermKind::Constrain {
                    constraint: a,
                    body: b,
                } => {
                    out.extend(a.free_refs().iter().cloned());
                    out.extend(b.free_refs().iter().cloned());
                }
                TermKind::Sym(_)
                | TermKind::Wildcard
                | TermKind::Arbitrary
                | TermKind::Instance(_) => {}
            }
            out
        })
    }

    pub fn is_ground(&self) -> bool {
        self.free_refs().is_empty()
    }

    /// Slot sequence used to key facts: the head of an application spine
    /// followed by each argument as a whole term. Anything else is one slot.
    pub fn flatten(&self) -> Vec<Term> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    pub fn flatten_into(&self, out: &mut Vec<Term>) {
        match self.kind() {
            TermKind::Apply { pred, arg } => {
                pred.flatten_into(out);
                out.push(arg.clone());
            }
            _ => out.push(self.clone()),
        }
    }

    /// Drops enclosing lambda binders, leaving their parameters free.
    pub fn strip_binders(&self) -> Term {
        let mut current = self;
        while let TermKind::Lambda { body, .. } = current.kind() {
            current = body;
        }
        current.clone()
    }

    /// The relation a fact asserts: binders and declare/constrain wrappers
    /// peeled off.
    pub fn head(&self) -> Term {
        let mut current = self;
        loop {
            match current.kind() {
                TermKind::Lambda { body, .. }
                | TermKind::Declare { body, .. }
                | TermKind::Constrain { body, .. } => current = body,
                _ => return current.clone(),
            }
        }
    }

    /// Display adapter that parenthesises non-atomic terms.
    pub fn closed(&self) -> Closed<'_> {
        Closed(self)
    }
}

// ============================================================================
// Equality / hashing
// ============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn mix(seed: u64, word: u64) -> u64 {
    fnv1a(seed, &word.to_le_bytes())
}

fn structural_hash(kind: &TermKind) -> u64 {
    let tagged = |tag: u64| mix(FNV_OFFSET_BASIS, tag);
    match kind {
        TermKind::Sym(name) => fnv1a(tagged(1), name.as_bytes()),
        TermKind::Wildcard => tagged(2),
        TermKind::Ref(name) => fnv1a(tagged(3), name.as_bytes()),
        TermKind::Arbitrary => tagged(4),
        TermKind::Instance(id) => mix(tagged(5), id.raw()),
        TermKind::Lambda { id, .. } => mix(tagged(6), id.raw()),
        TermKind::Apply { pred, arg } => mix(mix(tagged(7), pred.0.hash), arg.0.hash),
        TermKind::Declare { with, body } => mix(mix(tagged(8), with.0.hash), body.0.hash),
        TermKind::Constrain { constraint, body } => {
            mix(mix(tagged(9), constraint.0.hash), body.0.hash)
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        if Term::same(self, other) {
            return true;
        }
        if self.0.hash != other.0.hash {
            return false;
        }
        match (self.kind(), other.kind()) {
            (TermKind::Sym(a), TermKind::Sym(b)) | (TermKind::Ref(a), TermKind::Ref(b)) => a == b,
            (TermKind::Wildcard, TermKind::Wildcard)
            | (TermKind::Arbitrary, TermKind::Arbitrary) => true,
            (TermKind::Instance(a), TermKind::Instance(b)) => a == b,
            (TermKind::Lambda { id: a, .. }, TermKind::Lambda { id: b, .. }) => a == b,
            (TermKind::Apply { pred: p1, arg: a1 }, TermKind::Apply { pred: p2, arg: a2 }) => {
                p1 == p2 && a1 == a2
            }
            (TermKind::Declare { with: w1, body: b1 }, TermKind::Declare { with: w2, body: b2 }) => {
                w1 == w2 && b1 == b2
            }
            (
                TermKind::Constrain {
                    constraint: c1,
                    body: b1,
                },
                TermKind::Constrain {
                    constraint: c2,
                    body: b2,
                },
            ) => c1 == c2 && b1 == b2,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

// ============================================================================
// Printing
// ============================================================================

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TermKind::Sym(name) | TermKind::Ref(name) => f.write_str(name),
            TermKind::Wildcard => f.write_str("*"),
            TermKind::Arbitrary => f.write_str("?"),
            TermKind::Instance(id) => write!(f, "?{}", id.raw()),
            TermKind::Lambda { param, body, .. } => write!(f, "<{param}> {body}"),
            TermKind::Apply { pred, arg } => match pred.kind() {
                TermKind::Apply { .. } => write!(f, "{pred} {}", arg.closed()),
                _ => write!(f, "{} {}", pred.closed(), arg.closed()),
            },
            TermKind::Declare { with, body } => write!(f, "{{{with}}} {body}"),
            TermKind::Constrain { constraint, body } => write!(f, "[{constraint}] {body}"),
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term({self})")
    }
}

pub struct Closed<'a>(&'a Term);

impl fmt::Display for Closed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_atomic() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}
