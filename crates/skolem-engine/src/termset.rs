//! Deduplicated sets of alternative terms.

use std::fmt;

use ahash::AHashSet;
use skolem_dsl::Term;

/// Structurally deduplicated, insertion-ordered set of terms.
///
/// Insertion order keeps REPL output stable: results print in the order they
/// were first derived. Equality ignores order.
#[derive(Clone, Default)]
pub struct TermSet {
    items: Vec<Term>,
    seen: AHashSet<Term>,
}

impl TermSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            seen: AHashSet::with_capacity(n),
        }
    }

    pub fn single(term: Term) -> Self {
        let mut set = Self::with_capacity(1);
        set.insert(term);
        set
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns false when a structurally equal term was already present.
    pub fn insert(&mut self, term: Term) -> bool {
        if !self.seen.insert(term.clone()) {
            return false;
        }
        self.items.push(term);
        true
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.seen.contains(term)
    }

    pub fn contains_wildcard(&self) -> bool {
        self.seen.contains(&Term::wildcard())
    }

    /// Exactly `{*}`: the binding that marks a reference as still free.
    pub fn is_only_wildcard(&self) -> bool {
        self.items.len() == 1 && self.contains_wildcard()
    }

    /// The single member, if there is exactly one.
    pub fn as_single(&self) -> Option<&Term> {
        match self.items.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn extend(&mut self, other: TermSet) {
        for term in other.items {
            self.insert(term);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.items.iter()
    }
}

impl PartialEq for TermSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.items.iter().all(|t| other.contains(t))
    }
}

impl Eq for TermSet {}

impl IntoIterator for TermSet {
    type Item = Term;
    type IntoIter = std::vec::IntoIter<Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a TermSet {
    type Item = &'a Term;
    type IntoIter = std::slice::Iter<'a, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Term> for TermSet {
    fn from_iter<I: IntoIterator<Item = Term>>(iter: I) -> Self {
        let mut set = TermSet::new();
        for term in iter {
            set.insert(term);
        }
        set
    }
}

impl fmt::Debug for TermSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for TermSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, term) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{term}")?;
        }
        f.write_str("}")
    }
}
