//! Cycle guard for recursive fact resolution.
//!
//! Accepting a candidate fact may require re-evaluating it, which may query
//! the world again, which may select the same fact again. Every resolution
//! attempt is recorded as a [`CheckStep`]; a step is refused when appending it
//! would end the history with two identical adjacent runs of steps (compared
//! by candidate fact identity) whose combined length is at least half of the
//! history length plus one.
//!
//! This bounds every resolution loop (the repeated run eventually grows to
//! that cutoff) but is a heuristic: it can also cut legitimate deep
//! derivations short.

use std::cell::RefCell;
use std::rc::Rc;

use skolem_dsl::Term;

/// One resolution attempt: `goal` resolved against the stored fact `fact`.
#[derive(Clone, Debug)]
pub struct CheckStep {
    pub goal: Term,
    pub fact: Term,
}

impl CheckStep {
    pub fn new(goal: Term, fact: Term) -> Self {
        Self { goal, fact }
    }
}

impl PartialEq for CheckStep {
    fn eq(&self, other: &Self) -> bool {
        Term::same(&self.fact, &other.fact)
    }
}

impl Eq for CheckStep {}

/// Stack of in-flight resolution steps, shared by every layer of a world.
#[derive(Clone, Default)]
pub struct StepHistory {
    steps: Rc<RefCell<Vec<CheckStep>>>,
}

impl StepHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.borrow().is_empty()
    }

    pub fn is_legal(&self, next: &CheckStep) -> bool {
        !ends_with_repeat(&self.steps.borrow(), next)
    }

    /// Records `step` until the returned guard is dropped.
    pub fn enter(&self, step: CheckStep) -> StepGuard {
        self.steps.borrow_mut().push(step);
        StepGuard {
            history: self.clone(),
        }
    }
}

#[must_use = "the step is popped when the guard is dropped"]
pub struct StepGuard {
    history: StepHistory,
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        self.history.steps.borrow_mut().pop();
    }
}

/// Whether `steps ++ [next]` ends in `B B` for some run `B` with
/// `2 * |B| >= (steps.len() + 1) / 2`.
fn ends_with_repeat(steps: &[CheckStep], next: &CheckStep) -> bool {
    let len = steps.len() + 1;
    let cutoff = len / 2;
    let at = |i: usize| if i < steps.len() { &steps[i] } else { next };

    (1..=len / 2)
        .filter(|half| 2 * half >= cutoff)
        .any(|half| (0..half).all(|k| at(len - 2 * half + k) == at(len - half + k)))
}
