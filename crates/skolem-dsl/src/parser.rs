//! Surface syntax reader.
//!
//! Grammar (application is left-associative juxtaposition):
//!
//! ```text
//! expr := atom atom*
//! atom := '(' expr ')'
//!       | '<' name '>' expr      lambda
//!       | '[' expr ']' expr      constrain
//!       | '{' expr '}' expr      declare
//!       | '*' | '?' | name
//! ```
//!
//! A name parses as a reference when it is bound in the [`ParseEnv`] (lambda
//! parameters, REPL definitions) and as a symbol otherwise. Inside `[c] body`,
//! a symbol that occurs in `c` and in a value position of `body` (anywhere but
//! the head of an application) becomes a query variable in both, so
//! `[P x] x` reads "every `x` such that `P x`".

use std::collections::BTreeSet;

use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::char as pchar;
use nom::error::ErrorKind;
use nom::IResult;
use thiserror::Error;

use crate::term::{Name, Term, TermKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,
    #[error("expected a term at offset {offset}, found {found}")]
    Unexpected { offset: usize, found: String },
    #[error("unclosed `{open}` opened at offset {offset}")]
    Unclosed { offset: usize, open: char },
    #[error("expected a name at offset {offset}")]
    EmptySymbol { offset: usize },
    #[error("unexpected trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

/// Names that parse as references rather than symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseEnv {
    refs: BTreeSet<Name>,
}

impl ParseEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(names: impl IntoIterator<Item = Name>) -> Self {
        Self {
            refs: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains(name)
    }

    pub fn with(&self, name: Name) -> Self {
        let mut refs = self.refs.clone();
        refs.insert(name);
        Self { refs }
    }

    /// The same environment with `name` parsing as a symbol again.
    pub fn without(&self, name: &str) -> Self {
        let mut refs = self.refs.clone();
        refs.remove(name);
        Self { refs }
    }
}

pub fn parse(text: &str) -> Result<Term, ParseError> {
    parse_with(text, &ParseEnv::new())
}

pub fn parse_with(text: &str, env: &ParseEnv) -> Result<Term, ParseError> {
    let offset = |rest: &str| text.len() - rest.len();

    let (rest, _) = ws(text).map_err(|e| lower(text, e))?;
    if rest.is_empty() {
        return Err(ParseError::Empty);
    }
    let (rest, term) = expr(rest, env).map_err(|e| lower(text, e))?;
    let (rest, _) = ws(rest).map_err(|e| lower(text, e))?;
    if !rest.is_empty() {
        return Err(ParseError::TrailingInput {
            offset: offset(rest),
        });
    }
    Ok(term)
}

// ============================================================================
// Error plumbing
// ============================================================================

#[derive(Debug)]
enum FailKind {
    Unexpected,
    EmptySymbol,
    Unclosed(char),
}

#[derive(Debug)]
struct Fail<'a> {
    at: &'a str,
    kind: FailKind,
}

impl<'a> nom::error::ParseError<&'a str> for Fail<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Fail {
            at: input,
            kind: FailKind::Unexpected,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, Fail<'a>>;

fn lower(text: &str, err: nom::Err<Fail<'_>>) -> ParseError {
    let fail = match err {
        nom::Err::Error(f) | nom::Err::Failure(f) => f,
        nom::Err::Incomplete(_) => {
            return ParseError::Unexpected {
                offset: text.len(),
                found: "end of input".to_string(),
            }
        }
    };
    let offset = text.len() - fail.at.len();
    match fail.kind {
        FailKind::Unexpected => ParseError::Unexpected {
            offset,
            found: match fail.at.chars().next() {
                Some(c) => format!("`{c}`"),
                None => "end of input".to_string(),
            },
        },
        FailKind::EmptySymbol => ParseError::EmptySymbol { offset },
        FailKind::Unclosed(open) => ParseError::Unclosed { offset, open },
    }
}

fn failure<T>(at: &str, kind: FailKind) -> PResult<'_, T> {
    Err(nom::Err::Failure(Fail { at, kind }))
}

// ============================================================================
// Lexing
// ============================================================================

fn is_sym_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '<' | '>' | '{' | '}' | '*' | '?')
}

fn starts_atom(c: char) -> bool {
    matches!(c, '(' | '<' | '[' | '{' | '*' | '?') || is_sym_char(c)
}

fn ws(input: &str) -> PResult<'_, &str> {
    take_while(char::is_whitespace)(input)
}

fn name(input: &str) -> PResult<'_, &str> {
    match take_while1::<_, &str, Fail<'_>>(is_sym_char)(input) {
        Ok(ok) => Ok(ok),
        Err(_) => failure(input, FailKind::EmptySymbol),
    }
}

/// Consumes `close`, reporting an unclosed `open` bracket at `opened_at` otherwise.
fn closing<'a>(input: &'a str, open: char, close: char, opened_at: &'a str) -> PResult<'a, ()> {
    let (input, _) = ws(input)?;
    match pchar::<&str, Fail<'a>>(close)(input) {
        Ok((rest, _)) => Ok((rest, ())),
        Err(_) => failure(opened_at, FailKind::Unclosed(open)),
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn expr<'a>(input: &'a str, env: &ParseEnv) -> PResult<'a, Term> {
    let (mut input, mut acc) = atom(input, env)?;
    loop {
        let (rest, _) = ws(input)?;
        match rest.chars().next() {
            Some(c) if starts_atom(c) => {
                let (rest, next) = atom(rest, env)?;
                acc = Term::apply(acc, next);
                input = rest;
            }
            _ => return Ok((input, acc)),
        }
    }
}

fn atom<'a>(input: &'a str, env: &ParseEnv) -> PResult<'a, Term> {
    let (input, _) = ws(input)?;
    let Some(c) = input.chars().next() else {
        return failure(input, FailKind::Unexpected);
    };
    let after = &input[c.len_utf8()..];
    match c {
        '(' => {
            let (rest, inner) = expr(after, env)?;
            let (rest, _) = closing(rest, '(', ')', input)?;
            Ok((rest, inner))
        }
        '<' => {
            let (rest, _) = ws(after)?;
            let (rest, param) = name(rest)?;
            let (rest, _) = closing(rest, '<', '>', input)?;
            let param: Name = param.into();
            let (rest, body) = expr(rest, &env.with(param.clone()))?;
            Ok((rest, Term::lambda(param, body)))
        }
        '[' => {
            let (rest, constraint) = expr(after, env)?;
            let (rest, _) = closing(rest, '[', ']', input)?;
            let (rest, body) = expr(rest, env)?;
            Ok((rest, query(constraint, body, env)))
        }
        '{' => {
            let (rest, with) = expr(after, env)?;
            let (rest, _) = closing(rest, '{', '}', input)?;
            let (rest, body) = expr(rest, env)?;
            Ok((rest, Term::declare(with, body)))
        }
        '*' => Ok((after, Term::wildcard())),
        '?' => Ok((after, Term::arbitrary())),
        c if is_sym_char(c) => {
            let (rest, n) = name(input)?;
            let term = if env.contains(n) {
                Term::reference(n)
            } else {
                Term::sym(n)
            };
            Ok((rest, term))
        }
        _ => failure(input, FailKind::Unexpected),
    }
}

// ============================================================================
// Query variables
// ============================================================================

/// Builds `[constraint] body`, promoting shared symbols to query variables.
///
/// Variables already promoted by a nested query count as symbols here, so
/// `[P x] [Q x] x` binds `x` in both constraints.
fn query(constraint: Term, body: Term, env: &ParseEnv) -> Term {
    let names = Candidates { env };
    let mut in_constraint = BTreeSet::new();
    names.all(&constraint, &BTreeSet::new(), &mut in_constraint);
    let mut in_body = BTreeSet::new();
    names.values(&body, &BTreeSet::new(), &mut in_body);

    let shared: BTreeSet<Name> = in_constraint.intersection(&in_body).cloned().collect();
    if shared.is_empty() {
        return Term::constrain(constraint, body);
    }
    Term::constrain(promote(&constraint, &shared), promote(&body, &shared))
}

/// Collects names a query may promote: symbols, plus references that are
/// neither lambda parameters nor bound in the environment.
struct Candidates<'e> {
    env: &'e ParseEnv,
}

impl Candidates<'_> {
    fn free_name<'t>(&self, term: &'t Term, params: &BTreeSet<Name>) -> Option<&'t Name> {
        match term.kind() {
            TermKind::Sym(name) => Some(name),
            TermKind::Ref(name) if !params.contains(name) && !self.env.contains(name) => Some(name),
            _ => None,
        }
    }

    fn all(&self, term: &Term, params: &BTreeSet<Name>, out: &mut BTreeSet<Name>) {
        match term.kind() {
            TermKind::Sym(_) | TermKind::Ref(_) => {
                if let Some(name) = self.free_name(term, params) {
                    out.insert(name.clone());
                }
            }
            TermKind::Lambda { param, body, .. } => {
                let mut inner = params.clone();
                inner.insert(param.clone());
                self.all(body, &inner, out);
            }
            TermKind::Apply { pred: a, arg: b }
            | TermKind::Declare { with: a, body: b }
            | TermKind::Constrain {
                constraint: a,
                body: b,
            } => {
                self.all(a, params, out);
                self.all(b, params, out);
            }
            TermKind::Wildcard | TermKind::Arbitrary | TermKind::Instance(_) => {}
        }
    }

    /// Names outside head position: `P` in `P x` is a relation name, `x` a value.
    fn values(&self, term: &Term, params: &BTreeSet<Name>, out: &mut BTreeSet<Name>) {
        match term.kind() {
            TermKind::Apply { .. } => {
                let slots = term.flatten();
                if let Some((head, args)) = slots.split_first() {
                    if !matches!(head.kind(), TermKind::Sym(_)) {
                        self.values(head, params, out);
                    }
                    for arg in args {
                        self.values(arg, params, out);
                    }
                }
            }
            TermKind::Lambda { param, body, .. } => {
                let mut inner = params.clone();
                inner.insert(param.clone());
                self.values(body, &inner, out);
            }
            TermKind::Declare { with: a, body: b }
            | TermKind::Constrain {
                constraint: a,
                body: b,
            } => {
                self.values(a, params, out);
                self.values(b, params, out);
            }
            _ => self.all(term, params, out),
        }
    }
}

fn promote(term: &Term, names: &BTreeSet<Name>) -> Term {
    match term.kind() {
        TermKind::Sym(name) if names.contains(name) => Term::reference(name.clone()),
        TermKind::Lambda { param, body, .. } => {
            if names.contains(param) {
                // The parameter already shadows the promoted name.
                term.clone()
            } else {
                Term::lambda(param.clone(), promote(body, names))
            }
        }
        TermKind::Apply { pred, arg } => Term::apply(promote(pred, names), promote(arg, names)),
        TermKind::Declare { with, body } => Term::declare(promote(with, names), promote(body, names)),
        TermKind::Constrain { constraint, body } => {
            Term::constrain(promote(constraint, names), promote(body, names))
        }
        _ => term.clone(),
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
    fn application_is_left_associative() {
        let t = parse("f a b").expect("parse");
        assert_eq!(t, Term::apply(Term::apply(sym("f"), sym("a")), sym("b")));

        let t = parse("f (a b)").expect("parse");
        assert_eq!(t, Term::apply(sym("f"), Term::apply(sym("a"), sym("b"))));
    }

    #[test]
    fn lambda_parameter_parses_as_reference() {
        let t = parse("<x> f x y").expect("parse");
        let TermKind::Lambda { param, body, .. } = t.kind() else {
            panic!("expected lambda, got {t}");
        };
        assert_eq!(&**param, "x");
        assert_eq!(body, &Term::apply_all(sym("f"), [var("x"), sym("y")]));
    }

    #[test]
    fn wildcard_and_arbitrary() {
        assert!(parse("*").expect("parse").is_wildcard());
        let t = parse("? ?").expect("parse");
        assert_eq!(t, Term::apply(Term::arbitrary(), Term::arbitrary()));
    }

    #[test]
    fn env_names_parse_as_references() {
        let env = ParseEnv::new().with("id".into());
        let t = parse_with("id a", &env).expect("parse");
        assert_eq!(t, Term::apply(var("id"), sym("a")));

        let t = parse_with("id a", &env.without("id")).expect("parse");
        assert_eq!(t, Term::apply(sym("id"), sym("a")));
    }

    #[test]
    fn constrain_promotes_shared_value_symbols() {
        let t = parse("[P x] x").expect("parse");
        assert_eq!(t, Term::constrain(Term::apply(sym("P"), var("x")), var("x")));

        // Relation names in head position stay constants.
        let t = parse("[P x] P x").expect("parse");
        assert_eq!(
            t,
            Term::constrain(Term::apply(sym("P"), var("x")), Term::apply(sym("P"), var("x")))
        );

        // Symbols only in the constraint are constants.
        let t = parse("[P a] yes").expect("parse");
        assert_eq!(t, Term::constrain(Term::apply(sym("P"), sym("a")), sym("yes")));
    }

    #[test]
    fn nested_constrain_shares_outer_variables() {
        let t = parse("[P x] [Q x y] y").expect("parse");
        let inner = Term::constrain(Term::apply_all(sym("Q"), [var("x"), var("y")]), var("y"));
        assert_eq!(t, Term::constrain(Term::apply(sym("P"), var("x")), inner));
    }

    #[test]
    fn conjunctive_query_binds_variable_in_both_constraints() {
        let t = parse("[P x] [Q x] x").expect("parse");
        let inner = Term::constrain(Term::apply(sym("Q"), var("x")), var("x"));
        assert_eq!(t, Term::constrain(Term::apply(sym("P"), var("x")), inner));

        // Lambda parameters and environment names are not query variables.
        let t = parse("[P x] <x> [Q x] x").expect("parse");
        let TermKind::Constrain { constraint, .. } = t.kind() else {
            panic!("expected a constraint, got {t}");
        };
        assert_eq!(constraint, &Term::apply(sym("P"), sym("x")));

        let env = ParseEnv::new().with("x".into());
        let t = parse_with("[P y] [Q x] x", &env).expect("parse");
        let TermKind::Constrain { constraint, .. } = t.kind() else {
            panic!("expected a constraint, got {t}");
        };
        assert_eq!(constraint, &Term::apply(sym("P"), sym("y")));
    }

    #[test]
    fn declare_wraps_body() {
        let t = parse("{(P a)} [P x] x").expect("parse");
        let TermKind::Declare { with, body } = t.kind() else {
            panic!("expected declare, got {t}");
        };
        assert_eq!(with, &Term::apply(sym("P"), sym("a")));
        assert!(matches!(body.kind(), TermKind::Constrain { .. }));
    }

    #[test]
    fn reports_malformed_input() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("(a b"), Err(ParseError::Unclosed { offset: 0, open: '(' }));
        assert_eq!(parse("f [P x"), Err(ParseError::Unclosed { offset: 2, open: '[' }));
        assert_eq!(parse("<> x"), Err(ParseError::EmptySymbol { offset: 1 }));
        assert_eq!(parse("a )"), Err(ParseError::TrailingInput { offset: 2 }));
        assert!(matches!(parse("()"), Err(ParseError::Unexpected { offset: 1, .. })));
    }

    #[test]
    fn printing_round_trips() {
        for text in ["f a b", "f (g a) b", "{P a} [P x] x", "[P x] [Q x y] y", "* ?", "(a) b"] {
            let t = parse(text).expect("parse");
            let again = parse(&t.to_string()).expect("reparse");
            assert_eq!(t, again, "text={text} printed={t}");
        }
    }
}
