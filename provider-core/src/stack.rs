//! Last-in-first-out stack of currently open steps.
//!
//! A stack belongs to one execution cursor: the phase body owns the root stack
//! of its bucket and every async step gets a fresh one seeded with itself.
//! Mutation is internally locked so concurrent pushes and pops from sibling
//! branches are never lost, but keeping push/pop pairs balanced is the
//! caller's job.

use std::sync::{Mutex, MutexGuard};

use crate::arena::StepId;
use crate::sync::lock;

#[derive(Debug, Default)]
pub struct NestingStack {
    open: Mutex<Vec<StepId>>,
}

impl NestingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack whose innermost open step is `step`.
    pub fn seeded(step: StepId) -> Self {
        Self {
            open: Mutex::new(vec![step]),
        }
    }

    /// Makes `step` the innermost open scope.
    pub fn push(&self, step: StepId) {
        self.lock().push(step);
    }

    /// Removes the innermost step, or `None` when nothing is open.
    pub fn pop(&self) -> Option<StepId> {
        self.lock().pop()
    }

    /// Innermost open step without removing it.
    pub fn peek(&self) -> Option<StepId> {
        self.lock().last().copied()
    }

    /// Pops down to and including `step`, returning everything removed,
    /// innermost first. Used by scope guards so an unbalanced nested scope
    /// cannot leave stale entries behind.
    pub fn unwind_to(&self, step: StepId) -> Vec<StepId> {
        let mut open = self.lock();
        let Some(pos) = open.iter().rposition(|s| *s == step) else {
            return Vec::new();
        };
        let mut removed = open.split_off(pos);
        removed.reverse();
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every open entry, returning them innermost first.
    pub fn clear(&self) -> Vec<StepId> {
        let mut drained: Vec<StepId> = self.lock().drain(..).collect();
        drained.reverse();
        drained
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StepId>> {
        lock(&self.open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Step, StepArena};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ids(n: usize) -> Vec<StepId> {
        let mut arena = StepArena::new();
        (0..n).map(|i| arena.push(Step::new(format!("s{i}")))).collect()
    }

    #[test]
    fn test_pop_on_empty_is_none() {
        let stack = NestingStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.peek(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_seeded_stack_peeks_seed() {
        let id = ids(1)[0];
        let stack = NestingStack::seeded(id);
        assert_eq!(stack.peek(), Some(id));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_unwind_to_removes_inner_entries() {
        let all = ids(4);
        let stack = NestingStack::new();
        for id in &all {
            stack.push(*id);
        }
        let removed = stack.unwind_to(all[1]);
        assert_eq!(removed, vec![all[3], all[2], all[1]]);
        assert_eq!(stack.peek(), Some(all[0]));
        assert!(stack.unwind_to(all[3]).is_empty());
    }

    #[test]
    fn test_concurrent_pushes_are_not_lost() {
        let all = ids(64);
        let stack = Arc::new(NestingStack::new());
        std::thread::scope(|s| {
            for chunk in all.chunks(8) {
                let stack = Arc::clone(&stack);
                s.spawn(move || {
                    for id in chunk {
                        stack.push(*id);
                    }
                });
            }
        });
        assert_eq!(stack.len(), 64);
        assert_eq!(stack.clear().len(), 64);
        assert!(stack.is_empty());
    }

    proptest! {
        #[test]
        fn prop_balanced_push_pop_ends_empty(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let pool = ids(ops.len());
            let stack = NestingStack::new();
            let mut model: Vec<StepId> = Vec::new();
            for (i, push) in ops.iter().enumerate() {
                if *push {
                    stack.push(pool[i]);
                    model.push(pool[i]);
                } else {
                    prop_assert_eq!(stack.pop(), model.pop());
                }
                prop_assert_eq!(stack.peek(), model.last().copied());
            }
            while let Some(expected) = model.pop() {
                prop_assert_eq!(stack.pop(), Some(expected));
            }
            prop_assert_eq!(stack.pop(), None);
        }
    }
}
