//! Assertion helpers recorded as steps.
//!
//! Each check becomes a step named `Assert: <check>` with `expected` and
//! `actual` parameters. A failing soft check marks the step and its
//! ancestors failed and returns `false`; a failing hard check additionally
//! stops the sub-test.

use std::fmt::Debug;

use allure_provider_core::Outcome;

use crate::t::T;

/// Checks bound to a test handle; see [`T::assert`] and [`T::require`].
#[derive(Debug, Clone, Copy)]
pub struct Checks<'a> {
    t: &'a T,
    halt: bool,
}

impl<'a> Checks<'a> {
    pub(crate) fn soft(t: &'a T) -> Self {
        Self { t, halt: false }
    }

    pub(crate) fn hard(t: &'a T) -> Self {
        Self { t, halt: true }
    }

    pub fn equal<V: PartialEq + Debug>(&self, expected: V, actual: V) -> bool {
        let passed = expected == actual;
        self.check("equal", format!("{expected:?}"), format!("{actual:?}"), passed)
    }

    pub fn not_equal<V: PartialEq + Debug>(&self, unexpected: V, actual: V) -> bool {
        let passed = unexpected != actual;
        self.check(
            "not_equal",
            format!("not {unexpected:?}"),
            format!("{actual:?}"),
            passed,
        )
    }

    pub fn is_true(&self, value: bool) -> bool {
        self.check("is_true", "true".into(), value.to_string(), value)
    }

    pub fn is_false(&self, value: bool) -> bool {
        self.check("is_false", "false".into(), value.to_string(), !value)
    }

    /// `haystack` contains `needle`.
    pub fn contains(&self, haystack: &str, needle: &str) -> bool {
        self.check(
            "contains",
            format!("contains {needle:?}"),
            format!("{haystack:?}"),
            haystack.contains(needle),
        )
    }

    pub fn is_some<V: Debug>(&self, value: &Option<V>) -> bool {
        self.check("is_some", "Some(_)".into(), format!("{value:?}"), value.is_some())
    }

    pub fn is_none<V: Debug>(&self, value: &Option<V>) -> bool {
        self.check("is_none", "None".into(), format!("{value:?}"), value.is_none())
    }

    pub fn is_ok<V: Debug, E: Debug>(&self, value: &Result<V, E>) -> bool {
        self.check("is_ok", "Ok(_)".into(), format!("{value:?}"), value.is_ok())
    }

    pub fn is_err<V: Debug, E: Debug>(&self, value: &Result<V, E>) -> bool {
        self.check("is_err", "Err(_)".into(), format!("{value:?}"), value.is_err())
    }

    fn check(&self, name: &str, expected: String, actual: String, passed: bool) -> bool {
        self.t.step(format!("Assert: {name}"), |t| {
            t.step_parameter("expected", &expected);
            t.step_parameter("actual", &actual);
            if !passed {
                let message = format!("{name} failed: expected {expected}, actual {actual}");
                if self.halt {
                    t.error(Outcome::failed(message));
                } else {
                    t.fail(message);
                }
            }
        });
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_provider_core::{
        ExecutionContext, MemorySink, ReportScope, Status, TestResult,
    };
    use std::sync::Arc;

    fn run_body(body: impl FnOnce(&T)) -> TestResult {
        let sink = Arc::new(MemorySink::new());
        let scope = ReportScope::for_test("test_checks", "Checks::test_checks", sink);
        scope.enter(ExecutionContext::BeforeEach).unwrap();
        scope
            .run_phase(ExecutionContext::Test, |ctx| body(&T::new(ctx.clone())))
            .unwrap();
        scope.finalize().unwrap().unwrap()
    }

    #[test]
    fn test_passing_checks_record_steps() {
        let result = run_body(|t| {
            let check = t.assert();
            assert!(check.equal(4, 2 + 2));
            assert!(check.contains("hello world", "world"));
            assert!(check.is_some(&Some(1)));
            assert!(check.is_err(&Err::<(), _>("nope")));
        });

        assert_eq!(result.status, Status::Passed);
        assert_eq!(result.steps.len(), 4);
        let first = &result.steps[0];
        assert_eq!(first.name, "Assert: equal");
        assert_eq!(first.parameters[0].name, "expected");
        assert_eq!(first.parameters[0].value, "4");
        assert_eq!(first.parameters[1].value, "4");
    }

    #[test]
    fn test_soft_failure_continues() {
        let mut reached = false;
        let result = run_body(|t| {
            assert!(!t.assert().equal("a", "b"));
            reached = true;
        });
        assert!(reached);
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.steps[0].status, Status::Failed);
        assert_eq!(
            result.status_details.unwrap().message.as_deref(),
            Some("equal failed: expected \"a\", actual \"b\"")
        );
    }

    #[test]
    fn test_hard_failure_halts() {
        let mut reached = false;
        let result = run_body(|t| {
            t.require().is_true(false);
            reached = true;
        });
        assert!(!reached);
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].name, "Assert: is_true");
    }

    #[test]
    fn test_failed_check_marks_enclosing_step() {
        let result = run_body(|t| {
            t.step("validate response", |t| {
                t.assert().is_none(&Some("unexpected"));
            });
        });
        let outer = &result.steps[0];
        assert_eq!(outer.status, Status::Failed);
        assert_eq!(outer.steps[0].name, "Assert: is_none");
    }
}
