//! The step engine.
//!
//! A [`ReportScope`] owns everything recorded for one sub-test (or one suite):
//! the buckets of its phases, its result, its container and the outcome of
//! each phase. A [`StepCtx`] is a cheap handle bound to one bucket, one nesting
//! stack and one task scope; every step operation goes through it.
//!
//! Failures are recorded first and only then turned into control flow: a
//! halting phase unwinds with [`Halt`](crate::outcome::Halt), which step and
//! phase boundaries recognise and never report as a panic.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::arena::{Step, StepId};
use crate::context::{Bucket, ExecutionContext, PhaseMachine};
use crate::enums::{ContentType, Status};
use crate::error::{AllureError, AllureResult};
use crate::model::{
    Attachment, FixtureResult, Parameter, StatusDetails, TestResult, TestResultContainer,
};
use crate::outcome::{halt, is_halt, Outcome};
use crate::scope::TaskScope;
use crate::stack::NestingStack;
use crate::sync::lock;
use crate::writer::{compute_history_id, generate_uuid, ResultSink};

/// Recorded state of one sub-test or one suite.
pub struct ReportScope {
    name: String,
    machine: PhaseMachine,
    buckets: Vec<Arc<Bucket>>,
    result: Option<Mutex<TestResult>>,
    container: Mutex<TestResultContainer>,
    outcomes: Mutex<HashMap<ExecutionContext, Outcome>>,
    phase_tasks: Mutex<Vec<Arc<TaskScope>>>,
    finalized: AtomicBool,
    sink: Arc<dyn ResultSink>,
}

impl ReportScope {
    /// Scope of one sub-test: before-each, test body and after-each buckets,
    /// a result and its per-test container.
    pub fn for_test(
        name: impl Into<String>,
        full_name: impl Into<String>,
        sink: Arc<dyn ResultSink>,
    ) -> Arc<Self> {
        let name = name.into();
        let mut result = TestResult::new(generate_uuid(), name.clone());
        result.full_name = Some(full_name.into());
        Self::build(
            name,
            &[
                ExecutionContext::BeforeEach,
                ExecutionContext::Test,
                ExecutionContext::AfterEach,
            ],
            Some(result),
            sink,
        )
    }

    /// Scope of a whole suite: before-all and after-all buckets and the suite
    /// container that lists every sub-test result.
    pub fn for_suite(name: impl Into<String>, sink: Arc<dyn ResultSink>) -> Arc<Self> {
        let scope = Self::build(
            name.into(),
            &[ExecutionContext::BeforeAll, ExecutionContext::AfterAll],
            None,
            sink,
        );
        lock(&scope.container).name = Some(scope.name.clone());
        scope
    }

    fn build(
        name: String,
        contexts: &[ExecutionContext],
        result: Option<TestResult>,
        sink: Arc<dyn ResultSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            machine: PhaseMachine::new(),
            buckets: contexts.iter().map(|c| Bucket::new(*c)).collect(),
            result: result.map(Mutex::new),
            container: Mutex::new(TestResultContainer::new(generate_uuid())),
            outcomes: Mutex::new(HashMap::new()),
            phase_tasks: Mutex::new(Vec::new()),
            finalized: AtomicBool::new(false),
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_uuid(&self) -> Option<String> {
        self.result.as_ref().map(|r| lock(r).uuid.clone())
    }

    pub fn container_uuid(&self) -> String {
        lock(&self.container).uuid.clone()
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    /// Active phase, `None` before the first one.
    pub fn current(&self) -> Option<ExecutionContext> {
        self.machine.current()
    }

    pub fn bucket(&self, context: ExecutionContext) -> Option<Arc<Bucket>> {
        self.buckets
            .iter()
            .find(|b| b.context() == context)
            .map(Arc::clone)
    }

    /// Switches to `context` and returns the root handle of that phase.
    pub fn enter(self: &Arc<Self>, context: ExecutionContext) -> AllureResult<StepCtx> {
        let bucket = self.bucket(context).ok_or(AllureError::NoActiveContext)?;
        self.machine.enter(context)?;
        let tasks = Arc::new(TaskScope::new(context.to_string()));
        lock(&self.phase_tasks).push(Arc::clone(&tasks));
        Ok(StepCtx {
            scope: Arc::clone(self),
            stack: bucket.root_stack(),
            bucket,
            tasks,
        })
    }

    /// Enters `context`, runs `body` in it and waits for every async step it
    /// launched.
    ///
    /// Fixture phases record the whole invocation as one step named after the
    /// hook. Nothing unwinds out of this call; the phase outcome is returned.
    pub fn run_phase<F>(self: &Arc<Self>, context: ExecutionContext, body: F) -> AllureResult<Outcome>
    where
        F: FnOnce(&StepCtx),
    {
        let ctx = self.enter(context)?;
        let boundary = catch_unwind(AssertUnwindSafe(|| {
            if context.is_fixture() {
                ctx.with_new_step(context.hook_name(), |inner| {
                    body(inner);
                    inner.join();
                });
            } else {
                body(&ctx);
            }
        }));
        if let Err(payload) = boundary {
            if !is_halt(payload.as_ref()) {
                let outcome = Outcome::from_panic(payload.as_ref());
                tracing::debug!(scope = %self.name, %context, "recovered panic at phase boundary");
                self.record(context, &outcome);
            }
        }
        ctx.join();
        let leftover = ctx.stack.clear();
        if !leftover.is_empty() {
            tracing::debug!(scope = %self.name, %context, open = leftover.len(), "closing steps left open");
            for id in leftover {
                ctx.close_step(id, None);
            }
        }
        Ok(self.phase_outcome(context))
    }

    /// Records an outcome against `context` and, for a sub-test, its result.
    pub fn record(&self, context: ExecutionContext, outcome: &Outcome) {
        if *outcome == Outcome::Passed {
            return;
        }
        {
            let mut outcomes = lock(&self.outcomes);
            let entry = outcomes.entry(context).or_insert(Outcome::Passed);
            *entry = std::mem::replace(entry, Outcome::Passed).merge(outcome.clone());
        }
        if let Some(result) = &self.result {
            lock(result).worsen(outcome.status(), outcome.details());
        }
    }

    pub fn phase_outcome(&self, context: ExecutionContext) -> Outcome {
        lock(&self.outcomes)
            .get(&context)
            .cloned()
            .unwrap_or(Outcome::Passed)
    }

    /// Worst outcome over every phase run so far.
    pub fn outcome(&self) -> Outcome {
        let outcomes = lock(&self.outcomes);
        self.buckets
            .iter()
            .filter_map(|b| outcomes.get(&b.context()).cloned())
            .fold(Outcome::Passed, Outcome::merge)
    }

    /// Mutates the result of a sub-test scope. `None` for a suite scope.
    pub fn with_result<R>(&self, f: impl FnOnce(&mut TestResult) -> R) -> Option<R> {
        self.result.as_ref().map(|r| f(&mut lock(r)))
    }

    /// Links a result to this scope's container.
    pub fn add_child(&self, result_uuid: String) {
        lock(&self.container).add_child(result_uuid);
    }

    /// Assembles the step trees and hands the result and the non-empty
    /// container to the sink. Returns the finished result of a sub-test scope.
    pub fn finalize(&self) -> AllureResult<Option<TestResult>> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Err(AllureError::AlreadyFinalized(self.name.clone()));
        }
        let pending: Vec<Arc<TaskScope>> = lock(&self.phase_tasks).drain(..).collect();
        for tasks in pending {
            tasks.join();
        }

        let mut befores = Vec::new();
        let mut afters = Vec::new();
        let mut steps = Vec::new();
        for bucket in &self.buckets {
            let tree = bucket.take_tree();
            match bucket.context() {
                ExecutionContext::Test => steps = tree,
                ExecutionContext::BeforeEach | ExecutionContext::BeforeAll => {
                    befores.extend(tree.into_iter().map(FixtureResult::from))
                }
                ExecutionContext::AfterEach | ExecutionContext::AfterAll => {
                    afters.extend(tree.into_iter().map(FixtureResult::from))
                }
            }
        }

        let finished = self.result.as_ref().map(|result| {
            let mut result = lock(result);
            result.steps = steps;
            result.finish();
            let full_name = result.full_name.clone().unwrap_or_else(|| result.name.clone());
            result.history_id = Some(compute_history_id(&full_name, &result.parameters));
            result.clone()
        });

        let container = {
            let mut container = lock(&self.container);
            container.befores.extend(befores);
            container.afters.extend(afters);
            if let Some(result) = &finished {
                container.add_child(result.uuid.clone());
            }
            container.finish();
            container.clone()
        };

        let written = match &finished {
            Some(result) => self.sink.persist_result(result),
            None => Ok(()),
        };
        if container.is_empty() {
            tracing::trace!(scope = %self.name, "container has no fixtures, not persisted");
        } else {
            self.sink.persist_container(&container)?;
        }
        written?;
        tracing::debug!(scope = %self.name, status = ?finished.as_ref().map(|r| r.status), "scope finalized");
        Ok(finished)
    }
}

impl fmt::Debug for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportScope")
            .field("name", &self.name)
            .field("current", &self.current())
            .field("finalized", &self.finalized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Handle through which steps, parameters and attachments are recorded.
///
/// Cloning is cheap. Each execution cursor has its own nesting stack: the
/// phase body uses the bucket's root stack, every async step a fresh one.
#[derive(Clone)]
pub struct StepCtx {
    scope: Arc<ReportScope>,
    bucket: Arc<Bucket>,
    stack: Arc<NestingStack>,
    tasks: Arc<TaskScope>,
}

impl StepCtx {
    pub fn context(&self) -> ExecutionContext {
        self.bucket.context()
    }

    pub fn scope(&self) -> &Arc<ReportScope> {
        &self.scope
    }

    /// Innermost open step of this cursor.
    pub fn current_step(&self) -> Option<StepId> {
        self.stack.peek()
    }

    /// Snapshot of a recorded step.
    pub fn step(&self, id: StepId) -> Option<Step> {
        self.bucket.with_arena(|arena| arena.get(id).cloned())
    }

    /// Appends a step. Without an explicit parent it nests under the innermost
    /// open step.
    pub fn add_step(&self, mut step: Step) -> StepId {
        let open = self.stack.peek();
        self.bucket.with_arena(|arena| {
            if step.parent.is_none() {
                step.parent = open.and_then(|id| arena.get(id)).map(|s| s.uuid.clone());
            }
            let failed = step.status.is_failure();
            let id = arena.push(step);
            if failed {
                arena.propagate(id);
            }
            id
        })
    }

    /// Records a finished step with the given status.
    pub fn log_step(&self, name: impl Into<String>, status: Status) -> StepId {
        self.add_step(Step::new(name).with_status(status).finished())
    }

    pub fn with_new_step<R>(&self, name: impl Into<String>, body: impl FnOnce(&StepCtx) -> R) -> Option<R> {
        self.with_step(Step::new(name), body)
    }

    /// Runs `body` inside `step`.
    ///
    /// Returns `None` when the body panicked in a phase that keeps going
    /// after failures. In a halting phase the panic is recorded and the
    /// sub-test stops instead.
    pub fn with_step<R>(&self, step: Step, body: impl FnOnce(&StepCtx) -> R) -> Option<R> {
        let id = self.add_step(step);
        self.stack.push(id);
        let mut guard = OpenStep {
            ctx: self,
            id,
            forced: None,
        };
        match catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(value) => Some(value),
            Err(payload) if is_halt(payload.as_ref()) => {
                drop(guard);
                resume_unwind(payload)
            }
            Err(payload) => {
                let outcome = Outcome::from_panic(payload.as_ref());
                tracing::debug!(context = %self.context(), step = id.index(), "step body panicked");
                guard.forced = Some((Status::Broken, outcome.details()));
                drop(guard);
                self.stop_on_failure(outcome);
                None
            }
        }
    }

    /// Runs `body` as a step on its own thread.
    ///
    /// The parent is fixed here, on the calling thread. The task is owned by
    /// this cursor's task scope, so the enclosing async step (or the phase)
    /// waits for it. A panic marks the step and the result broken and stays
    /// inside the task.
    pub fn with_async_step<F>(&self, name: impl Into<String>, body: F)
    where
        F: FnOnce(&StepCtx) + Send + 'static,
    {
        let name = name.into();
        let id = self.add_step(Step::new(name.clone()));
        let child = StepCtx {
            scope: Arc::clone(&self.scope),
            bucket: Arc::clone(&self.bucket),
            stack: Arc::new(NestingStack::seeded(id)),
            tasks: Arc::new(TaskScope::new(name.clone())),
        };
        if let Err(err) = self.tasks.spawn(name.clone(), move || child.run_async(id, body)) {
            tracing::error!(step = %name, error = %err, "failed to start async step");
            let outcome = Outcome::broken(format!("failed to start async step: {err}"));
            self.bucket.with_arena(|arena| {
                arena.close(id, Some((Status::Broken, outcome.details())));
                arena.propagate(id);
            });
            self.scope.record(self.context(), &outcome);
        }
    }

    fn run_async<F>(self, id: StepId, body: F)
    where
        F: FnOnce(&StepCtx),
    {
        let ran = catch_unwind(AssertUnwindSafe(|| body(&self)));
        self.tasks.join();
        let forced = match ran {
            Ok(()) => None,
            Err(payload) if is_halt(payload.as_ref()) => None,
            Err(payload) => {
                let outcome = Outcome::from_panic(payload.as_ref());
                tracing::debug!(context = %self.context(), step = id.index(), "async step panicked");
                self.scope.record(self.context(), &outcome);
                Some((Status::Broken, outcome.details()))
            }
        };
        self.close_step(id, forced);
        self.stack.clear();
    }

    /// Waits for the async steps owned by this cursor.
    pub fn join(&self) -> usize {
        self.tasks.join()
    }

    /// Adds a parameter to the innermost open step; no-op when none is open.
    pub fn add_parameter(&self, name: impl Into<String>, value: impl ToString) {
        self.add_step_parameter(Parameter::new(name, value.to_string()));
    }

    pub fn add_step_parameter(&self, parameter: Parameter) {
        let Some(id) = self.stack.peek() else {
            tracing::trace!(parameter = %parameter.name, "no open step, parameter dropped");
            return;
        };
        self.bucket.with_arena(|arena| {
            if let Some(step) = arena.get_mut(id) {
                step.parameters.push(parameter);
            }
        });
    }

    /// Adds an attachment to the innermost open step; no-op when none is open.
    pub fn add_attachment(&self, attachment: Attachment) {
        let Some(id) = self.stack.peek() else {
            tracing::trace!(attachment = %attachment.name, "no open step, attachment dropped");
            return;
        };
        self.bucket.with_arena(|arena| {
            if let Some(step) = arena.get_mut(id) {
                step.attachments.push(attachment);
            }
        });
    }

    /// Writes `content` through the sink and attaches it to the innermost
    /// open step, or to the result when a test body has no step open.
    pub fn attach_binary(&self, name: impl Into<String>, content: &[u8], content_type: ContentType) {
        let name = name.into();
        match self.scope.sink.write_attachment(&name, content, content_type) {
            Ok(attachment) => self.attach(attachment),
            Err(err) => tracing::warn!(attachment = %name, error = %err, "failed to write attachment"),
        }
    }

    pub fn attach_text(&self, name: impl Into<String>, content: impl AsRef<str>) {
        self.attach_binary(name, content.as_ref().as_bytes(), ContentType::Text);
    }

    pub fn attach_json<S: Serialize + ?Sized>(&self, name: impl Into<String>, value: &S) {
        let name = name.into();
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => self.attach_binary(name, &bytes, ContentType::Json),
            Err(err) => tracing::warn!(attachment = %name, error = %err, "failed to serialize attachment"),
        }
    }

    fn attach(&self, attachment: Attachment) {
        if self.stack.is_empty() && self.context() == ExecutionContext::Test {
            self.scope.with_result(|r| r.add_attachment(attachment));
        } else {
            self.add_attachment(attachment);
        }
    }

    /// Records `outcome` on the innermost open step, its open ancestors and
    /// the owning scope. Execution continues.
    pub fn record(&self, outcome: &Outcome) {
        if let Some(id) = self.stack.peek() {
            self.bucket.with_arena(|arena| {
                arena.record(id, outcome.status(), outcome.details());
                arena.propagate(id);
            });
        }
        self.scope.record(self.context(), outcome);
    }

    /// Soft assertion failure.
    pub fn fail(&self, message: impl Into<String>) {
        self.record(&Outcome::failed(message));
    }

    pub fn broken(&self, message: impl Into<String>) {
        self.record(&Outcome::broken(message));
    }

    /// Records `outcome`, then stops the sub-test if the active phase halts
    /// on failure. Teardown phases return normally.
    pub fn error(&self, outcome: Outcome) {
        self.record(&outcome);
        if self.context().halts_on_failure() {
            halt();
        }
    }

    fn stop_on_failure(&self, outcome: Outcome) {
        self.scope.record(self.context(), &outcome);
        if self.context().halts_on_failure() {
            halt();
        }
    }

    fn close_step(&self, id: StepId, forced: Option<(Status, Option<StatusDetails>)>) {
        let removed = self.stack.unwind_to(id);
        self.bucket.with_arena(|arena| {
            for inner in removed.into_iter().filter(|s| *s != id) {
                arena.close(inner, None);
                arena.propagate(inner);
            }
            arena.close(id, forced);
            arena.propagate(id);
        });
    }
}

impl fmt::Debug for StepCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCtx")
            .field("scope", &self.scope.name)
            .field("context", &self.context())
            .field("depth", &self.stack.len())
            .finish()
    }
}

/// Closes its step on every exit path.
struct OpenStep<'a> {
    ctx: &'a StepCtx,
    id: StepId,
    forced: Option<(Status, Option<StatusDetails>)>,
}

impl Drop for OpenStep<'_> {
    fn drop(&mut self) {
        self.ctx.close_step(self.id, self.forced.take());
    }
}
