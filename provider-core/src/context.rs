//! Execution contexts: which phase of a test's lifecycle is active and where
//! the steps it creates are recorded.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::arena::StepArena;
use crate::error::{AllureError, AllureResult};
use crate::model::StepResult;
use crate::stack::NestingStack;
use crate::sync::lock;

/// Lifecycle phase that new steps, attachments and parameters are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    Test,
    BeforeEach,
    AfterEach,
    BeforeAll,
    AfterAll,
}

impl ExecutionContext {
    /// Whether a failure recorded in this phase stops the enclosing scope.
    ///
    /// Teardown phases keep going so that cleanup is never cut short by its
    /// own failures.
    pub fn halts_on_failure(self) -> bool {
        matches!(
            self,
            ExecutionContext::Test | ExecutionContext::BeforeEach | ExecutionContext::BeforeAll
        )
    }

    /// Whether steps of this phase are recorded in a container rather than
    /// the test result.
    pub fn is_fixture(self) -> bool {
        !matches!(self, ExecutionContext::Test)
    }

    pub fn is_suite_level(self) -> bool {
        matches!(self, ExecutionContext::BeforeAll | ExecutionContext::AfterAll)
    }

    /// Hook name used for fixture entries.
    pub fn hook_name(self) -> &'static str {
        match self {
            ExecutionContext::Test => "test",
            ExecutionContext::BeforeEach => "before_each",
            ExecutionContext::AfterEach => "after_each",
            ExecutionContext::BeforeAll => "before_all",
            ExecutionContext::AfterAll => "after_all",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionContext::Test => "Test",
            ExecutionContext::BeforeEach => "BeforeEach",
            ExecutionContext::AfterEach => "AfterEach",
            ExecutionContext::BeforeAll => "BeforeAll",
            ExecutionContext::AfterAll => "AfterAll",
        };
        f.write_str(name)
    }
}

/// Explicit phase transitions of one scope.
///
/// A sub-test walks `BeforeEach -> Test -> AfterEach`; a suite walks
/// `BeforeAll -> AfterAll`, with its sub-tests running in their own machines
/// in between. Every other move is rejected.
#[derive(Debug, Default)]
pub struct PhaseMachine {
    state: Mutex<Option<ExecutionContext>>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active phase, or `None` before the first transition.
    pub fn current(&self) -> Option<ExecutionContext> {
        *self.lock()
    }

    pub fn enter(&self, next: ExecutionContext) -> AllureResult<()> {
        use ExecutionContext::*;

        let mut state = self.lock();
        let allowed = matches!(
            (*state, next),
            (None, BeforeEach)
                | (None, BeforeAll)
                | (Some(BeforeEach), Test)
                | (Some(Test), AfterEach)
                | (Some(BeforeAll), AfterAll)
        );
        if !allowed {
            return Err(AllureError::InvalidTransition {
                from: state.map_or_else(|| "Idle".to_string(), |s| s.to_string()),
                to: next.to_string(),
            });
        }
        let previous = *state;
        tracing::trace!(from = ?previous, to = %next, "entering phase");
        *state = Some(next);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExecutionContext>> {
        lock(&self.state)
    }
}

/// Backing step list of one phase plus the nesting stack of the code running
/// it directly (async steps bring their own stacks).
#[derive(Debug)]
pub struct Bucket {
    context: ExecutionContext,
    arena: Mutex<StepArena>,
    root: Arc<NestingStack>,
}

impl Bucket {
    pub fn new(context: ExecutionContext) -> Arc<Self> {
        Arc::new(Self {
            context,
            arena: Mutex::new(StepArena::new()),
            root: Arc::new(NestingStack::new()),
        })
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn root_stack(&self) -> Arc<NestingStack> {
        Arc::clone(&self.root)
    }

    /// Runs `f` with exclusive access to the arena.
    pub fn with_arena<R>(&self, f: impl FnOnce(&mut StepArena) -> R) -> R {
        let mut arena = lock(&self.arena);
        f(&mut arena)
    }

    pub fn len(&self) -> usize {
        self.with_arena(|a| a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves the recorded steps out as an assembled tree.
    pub fn take_tree(&self) -> Vec<StepResult> {
        let arena = self.with_arena(std::mem::take);
        arena.into_tree()
    }
}
