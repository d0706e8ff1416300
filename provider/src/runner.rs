//! Suite runner.
//!
//! Phase order per suite:
//!
//! 1. `before_all`, once. If it does not pass, `after_all` still runs once
//!    and no test is started.
//! 2. Every test on its own thread (or in sequence when `parallel` is off):
//!    `before_each`, test body, `after_each`, each phase joined before the
//!    next; then the result and its container are persisted.
//! 3. Whichever test finishes last runs `after_all`, joins it and persists
//!    the suite container.
//!
//! Panics are recovered at phase boundaries and only affect the test they
//! happened in.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;

use allure_provider_core::{
    AllureConfig, AllureError, AllureResult, AllureWriter, ExecutionContext, LabelName, Outcome,
    thread_name, ReportScope, ResultSink, Status, TestResult,
};
use allure_provider_core::sync::{into_inner, lock};

use crate::suite::{Hook, Registry, Suite, TestMethod};
use crate::t::T;

const FRAMEWORK: &str = "allure-provider";

/// Outcome of one test as seen by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub name: String,
    pub full_name: String,
    /// Uuid of the persisted result
    pub uuid: Option<String>,
    pub status: Status,
    pub before_each: Outcome,
    /// Teardown faults also land on `status`, except on a skipped result.
    pub after_each: Outcome,
}

impl TestReport {
    fn broken(name: &str, full_name: String) -> Self {
        Self {
            name: name.to_string(),
            full_name,
            uuid: None,
            status: Status::Broken,
            before_each: Outcome::Passed,
            after_each: Outcome::Passed,
        }
    }

    /// Whether the test or one of its per-test hooks failed.
    pub fn is_failure(&self) -> bool {
        self.status.is_failure() || self.before_each.is_failure() || self.after_each.is_failure()
    }
}

/// Everything a suite run produced.
#[derive(Debug)]
pub struct SuiteReport {
    pub suite: String,
    pub container_uuid: String,
    pub before_all: Outcome,
    pub after_all: Outcome,
    pub tests: Vec<TestReport>,
    /// Persistence and lifecycle errors; they never abort the run.
    pub errors: Vec<AllureError>,
}

impl SuiteReport {
    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Tests that ended failed or broken, or whose per-test hooks did.
    pub fn failures(&self) -> Vec<&TestReport> {
        self.tests.iter().filter(|t| t.is_failure()).collect()
    }

    pub fn passed(&self) -> bool {
        !self.before_all.is_failure()
            && !self.after_all.is_failure()
            && self.failures().is_empty()
            && self.errors.is_empty()
    }

    /// Panics with a summary unless the suite passed. Lets a `#[test]`
    /// wrapping a suite run fail the way cargo expects.
    pub fn assert_passed(&self) {
        if self.passed() {
            return;
        }
        let mut lines = vec![format!("suite {} did not pass", self.suite)];
        if self.before_all.is_failure() {
            lines.push(format!("  before_all: {:?}", self.before_all));
        }
        for test in self.failures() {
            let mut line = format!("  {}: {}", test.full_name, test.status);
            if test.before_each.is_failure() {
                line.push_str(&format!(", before_each: {:?}", test.before_each));
            }
            if test.after_each.is_failure() {
                line.push_str(&format!(", after_each: {:?}", test.after_each));
            }
            lines.push(line);
        }
        if self.after_all.is_failure() {
            lines.push(format!("  after_all: {:?}", self.after_all));
        }
        for err in &self.errors {
            lines.push(format!("  error: {err}"));
        }
        panic!("{}", lines.join("\n"));
    }
}

/// Runs suites and hands their results to a [`ResultSink`].
#[derive(Clone)]
pub struct Runner {
    config: AllureConfig,
    sink: Arc<dyn ResultSink>,
}

impl Runner {
    pub fn new(config: AllureConfig, sink: Arc<dyn ResultSink>) -> Self {
        Self { config, sink }
    }

    /// A runner writing files into the configured results directory.
    pub fn from_config(config: AllureConfig) -> AllureResult<Self> {
        let writer = AllureWriter::from_config(&config)?;
        Ok(Self::new(config, Arc::new(writer)))
    }

    /// [`Runner::from_config`] with `ALLURE_OUTPUT_PATH` / `ALLURE_OUTPUT_FOLDER`.
    pub fn from_env() -> AllureResult<Self> {
        Self::from_config(AllureConfig::from_env()?)
    }

    pub fn config(&self) -> &AllureConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    pub fn run<S: Suite>(&self, suite: &S) -> SuiteReport {
        let registry = S::registry();
        let suite_name = suite.suite_name();
        let suite_scope = ReportScope::for_suite(suite_name.clone(), Arc::clone(&self.sink));
        let errors = Mutex::new(Vec::new());
        tracing::debug!(suite = %suite_name, tests = registry.len(), parallel = self.config.parallel, "running suite");

        let before_all = self.hook_phase(
            &suite_scope,
            ExecutionContext::BeforeAll,
            registry.before_all_hook(),
            suite,
            &errors,
        );

        let after_all = Mutex::new(Outcome::Passed);
        let countdown = Countdown::new(registry.len());
        let run_after_all = || {
            let outcome = self.hook_phase(
                &suite_scope,
                ExecutionContext::AfterAll,
                registry.after_all_hook(),
                suite,
                &errors,
            );
            *lock(&after_all) = outcome;
            if let Err(err) = suite_scope.finalize() {
                tracing::error!(suite = %suite_scope.name(), error = %err, "failed to persist suite container");
                lock(&errors).push(err);
            }
        };

        let mut tests = Vec::with_capacity(registry.len());
        if before_all.status() != Status::Passed {
            tracing::warn!(suite = %suite_name, skipped = registry.len(), "before_all did not pass, no test is started");
            countdown.run_once(&run_after_all);
        } else if registry.is_empty() {
            countdown.run_once(&run_after_all);
        } else {
            let unit = |method: &TestMethod<S>| -> TestReport {
                let report = catch_unwind(AssertUnwindSafe(|| {
                    self.run_test(suite, &registry, &suite_name, method, &errors)
                }))
                .unwrap_or_else(|_| {
                    tracing::error!(test = %method.name(), "test runner panicked");
                    TestReport::broken(method.name(), full_name(&suite_name, method.name()))
                });
                if let Some(uuid) = &report.uuid {
                    suite_scope.add_child(uuid.clone());
                }
                countdown.finish_one(&run_after_all);
                report
            };

            if self.config.parallel && registry.len() > 1 {
                thread::scope(|s| {
                    let unit = &unit;
                    let spawned: Vec<_> = registry
                        .tests()
                        .iter()
                        .map(|method| {
                            let handle = thread::Builder::new()
                                .name(thread_name(method.name()))
                                .spawn_scoped(s, move || unit(method));
                            (method, handle)
                        })
                        .collect();
                    for (method, handle) in spawned {
                        let report = match handle {
                            Ok(handle) => handle.join().unwrap_or_else(|_| {
                                TestReport::broken(method.name(), full_name(&suite_name, method.name()))
                            }),
                            Err(err) => {
                                tracing::warn!(test = %method.name(), error = %err, "could not spawn test thread, running inline");
                                unit(method)
                            }
                        };
                        tests.push(report);
                    }
                });
            } else {
                tests.extend(registry.tests().iter().map(unit));
            }
        }

        let after_all = lock(&after_all).clone();
        let errors = into_inner(errors);
        SuiteReport {
            suite: suite_name,
            container_uuid: suite_scope.container_uuid(),
            before_all,
            after_all,
            tests,
            errors,
        }
    }

    fn run_test<S: Suite>(
        &self,
        suite: &S,
        registry: &Registry<S>,
        suite_name: &str,
        method: &TestMethod<S>,
        errors: &Mutex<Vec<AllureError>>,
    ) -> TestReport {
        let full_name = full_name(suite_name, method.name());
        let scope = ReportScope::for_test(method.name(), full_name.clone(), Arc::clone(&self.sink));
        scope.with_result(|r| default_labels(r, suite_name, method.name()));

        let before_each = self.hook_phase(
            &scope,
            ExecutionContext::BeforeEach,
            registry.before_each_hook(),
            suite,
            errors,
        );
        let body = if before_each.status() == Status::Passed {
            scope.run_phase(ExecutionContext::Test, |ctx| {
                method.call(suite, &T::new(ctx.clone()))
            })
        } else {
            tracing::debug!(test = %full_name, "before_each did not pass, skipping test body");
            scope.enter(ExecutionContext::Test).map(|_| Outcome::Passed)
        };
        if let Err(err) = body {
            record_error(errors, &full_name, err);
        }
        let after_each = self.hook_phase(
            &scope,
            ExecutionContext::AfterEach,
            registry.after_each_hook(),
            suite,
            errors,
        );

        let uuid = match scope.finalize() {
            Ok(result) => result.map(|r| r.uuid),
            Err(err) => {
                record_error(errors, &full_name, err);
                None
            }
        };
        let status = scope.with_result(|r| r.status).unwrap_or(Status::Unknown);
        tracing::debug!(test = %full_name, %status, "test finished");
        TestReport {
            name: method.name().to_string(),
            full_name,
            uuid,
            status,
            before_each,
            after_each,
        }
    }

    /// Runs a hook phase; a missing hook still walks the phase transition.
    fn hook_phase<S>(
        &self,
        scope: &Arc<ReportScope>,
        context: ExecutionContext,
        hook: Option<&Hook<S>>,
        suite: &S,
        errors: &Mutex<Vec<AllureError>>,
    ) -> Outcome {
        let phase = match hook {
            Some(hook) => scope.run_phase(context, |ctx| hook(suite, &T::new(ctx.clone()))),
            None => scope.enter(context).map(|ctx| {
                ctx.join();
                scope.phase_outcome(context)
            }),
        };
        phase.unwrap_or_else(|err| {
            let outcome = Outcome::broken(err.to_string());
            record_error(errors, scope.name(), err);
            outcome
        })
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Counts finished tests; the last one triggers the suite teardown exactly
/// once.
struct Countdown {
    remaining: AtomicUsize,
    once: Once,
}

impl Countdown {
    fn new(tests: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(tests),
            once: Once::new(),
        }
    }

    fn finish_one(&self, last: impl Fn()) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.run_once(last);
        }
    }

    fn run_once(&self, f: impl Fn()) {
        self.once.call_once(|| f());
    }
}

fn full_name(suite: &str, test: &str) -> String {
    format!("{suite}::{test}")
}

fn default_labels(result: &mut TestResult, suite: &str, test: &str) {
    result.add_label_name(LabelName::Suite, suite);
    result.add_label_name(LabelName::TestMethod, test);
    result.add_label_name(LabelName::Host, host_name());
    result.add_label_name(LabelName::Thread, thread_label());
    result.add_label_name(LabelName::Language, "rust");
    result.add_label_name(LabelName::Framework, FRAMEWORK);
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn thread_label() -> String {
    let current = thread::current();
    let name = current.name().unwrap_or("main");
    format!("{}-{}", std::process::id(), name)
}

fn record_error(errors: &Mutex<Vec<AllureError>>, scope: &str, err: AllureError) {
    tracing::error!(scope = %scope, error = %err, "suite lifecycle error");
    lock(errors).push(err);
}
