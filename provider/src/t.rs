//! The handle passed to test bodies and hooks.

use std::path::Path;

use allure_provider_core::{
    ContentType, ExecutionContext, LabelName, LinkType, Outcome, Parameter, Severity, Status,
    StepCtx, TestResult,
};
use serde::Serialize;

use crate::assert::Checks;

/// Per-phase handle of a running sub-test or suite hook.
///
/// Every call lands in the bucket of the phase the handle was created for:
/// the test body records into the result, hooks into their container
/// fixture. Metadata setters only apply to sub-test results and are ignored
/// in suite hooks.
#[derive(Debug, Clone)]
pub struct T {
    ctx: StepCtx,
}

impl T {
    pub(crate) fn new(ctx: StepCtx) -> Self {
        Self { ctx }
    }

    /// Phase this handle records into.
    pub fn context(&self) -> ExecutionContext {
        self.ctx.context()
    }

    /// Test (or suite) this handle belongs to.
    pub fn name(&self) -> &str {
        self.ctx.scope().name()
    }

    /// Lower-level engine handle.
    pub fn step_ctx(&self) -> &StepCtx {
        &self.ctx
    }

    // === Steps ===

    /// Runs `body` as a nested step.
    ///
    /// Returns `None` when the body panicked during teardown; in a halting
    /// phase such a panic stops the sub-test instead.
    pub fn step<R>(&self, name: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.ctx
            .with_new_step(name, |ctx| body(&T::new(ctx.clone())))
    }

    /// Runs `body` as a step on its own thread. The phase does not end until
    /// it has finished.
    pub fn async_step<F>(&self, name: impl Into<String>, body: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.ctx
            .with_async_step(name, move |ctx| body(&T::new(ctx.clone())));
    }

    /// Records a step without a body.
    pub fn log_step(&self, name: impl Into<String>, status: Status) {
        self.ctx.log_step(name, status);
    }

    pub fn given<R>(&self, description: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.step(format!("Given {}", description.into()), body)
    }

    pub fn when<R>(&self, description: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.step(format!("When {}", description.into()), body)
    }

    pub fn then<R>(&self, description: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.step(format!("Then {}", description.into()), body)
    }

    pub fn and<R>(&self, description: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.step(format!("And {}", description.into()), body)
    }

    pub fn but<R>(&self, description: impl Into<String>, body: impl FnOnce(&T) -> R) -> Option<R> {
        self.step(format!("But {}", description.into()), body)
    }

    /// Adds a parameter to the innermost open step.
    pub fn step_parameter(&self, name: impl Into<String>, value: impl ToString) {
        self.ctx.add_parameter(name, value);
    }

    // === Attachments ===

    pub fn attach_text(&self, name: impl Into<String>, content: impl AsRef<str>) {
        self.ctx.attach_text(name, content);
    }

    pub fn attach_json<S: Serialize + ?Sized>(&self, name: impl Into<String>, value: &S) {
        self.ctx.attach_json(name, value);
    }

    pub fn attach_binary(&self, name: impl Into<String>, content: &[u8], content_type: ContentType) {
        self.ctx.attach_binary(name, content, content_type);
    }

    /// Copies a file into the results as an attachment.
    pub fn attach_file(
        &self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        content_type: Option<ContentType>,
    ) {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(content) => {
                let content_type = content_type.unwrap_or(ContentType::Binary);
                self.ctx.attach_binary(name, &content, content_type);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read attachment file")
            }
        }
    }

    // === Metadata ===

    pub fn title(&self, name: impl Into<String>) {
        let name = name.into();
        self.with_result(|r| r.name = name);
    }

    pub fn description(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_result(|r| r.description = Some(text));
    }

    pub fn label(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.with_result(|r| r.add_label(name, value));
    }

    pub fn epic(&self, name: impl Into<String>) {
        self.label(LabelName::Epic.as_str(), name);
    }

    pub fn feature(&self, name: impl Into<String>) {
        self.label(LabelName::Feature.as_str(), name);
    }

    pub fn story(&self, name: impl Into<String>) {
        self.label(LabelName::Story.as_str(), name);
    }

    pub fn owner(&self, name: impl Into<String>) {
        self.label(LabelName::Owner.as_str(), name);
    }

    pub fn severity(&self, severity: Severity) {
        self.label(LabelName::Severity.as_str(), severity.as_str());
    }

    pub fn tag(&self, name: impl Into<String>) {
        self.label(LabelName::Tag.as_str(), name);
    }

    pub fn tags(&self, names: &[&str]) {
        for name in names {
            self.tag(*name);
        }
    }

    pub fn link(&self, url: impl Into<String>, name: Option<String>) {
        let url = url.into();
        self.with_result(|r| r.add_link(url, name, LinkType::Default));
    }

    pub fn issue(&self, url: impl Into<String>, name: Option<String>) {
        let url = url.into();
        self.with_result(|r| r.add_link(url, name, LinkType::Issue));
    }

    pub fn tms(&self, url: impl Into<String>, name: Option<String>) {
        let url = url.into();
        self.with_result(|r| r.add_link(url, name, LinkType::Tms));
    }

    /// Adds a test-level parameter; it takes part in the history id.
    pub fn parameter(&self, name: impl Into<String>, value: impl ToString) {
        let parameter = Parameter::new(name, value.to_string());
        self.with_result(|r| r.add_parameter(parameter));
    }

    /// Adds a parameter left out of the history id.
    pub fn parameter_excluded(&self, name: impl Into<String>, value: impl ToString) {
        let parameter = Parameter::excluded(name, value.to_string());
        self.with_result(|r| r.add_parameter(parameter));
    }

    pub fn parameter_masked(&self, name: impl Into<String>, value: impl ToString) {
        let parameter = Parameter::masked(name, value.to_string());
        self.with_result(|r| r.add_parameter(parameter));
    }

    pub fn flaky(&self) {
        self.with_result(|r| {
            r.status_details.get_or_insert_with(Default::default).flaky = Some(true);
        });
    }

    pub fn muted(&self) {
        self.with_result(|r| {
            r.status_details.get_or_insert_with(Default::default).muted = Some(true);
        });
    }

    /// Marks the test as affected by a known issue and links it.
    pub fn known_issue(&self, issue: impl Into<String>) {
        let issue = issue.into();
        self.with_result(|r| {
            r.status_details.get_or_insert_with(Default::default).known = Some(true);
            r.add_link(issue.clone(), Some(issue), LinkType::Issue);
        });
    }

    fn with_result(&self, f: impl FnOnce(&mut TestResult)) {
        if self.ctx.scope().with_result(f).is_none() {
            tracing::trace!(context = %self.context(), "metadata ignored outside a sub-test");
        }
    }

    // === Failures ===

    /// Records an assertion failure and keeps going.
    pub fn fail(&self, message: impl Into<String>) {
        self.ctx.fail(message);
    }

    /// Records an assertion failure and stops the sub-test (teardown keeps
    /// going).
    pub fn fail_now(&self, message: impl Into<String>) {
        self.ctx.error(Outcome::failed(message));
    }

    /// Records a broken outcome and keeps going.
    pub fn broken(&self, message: impl Into<String>) {
        self.ctx.broken(message);
    }

    pub fn broken_now(&self, message: impl Into<String>) {
        self.ctx.error(Outcome::broken(message));
    }

    /// Marks the test skipped and stops it.
    pub fn skip(&self, reason: impl Into<String>) {
        self.ctx.error(Outcome::skipped(reason));
    }

    /// Records `outcome` and halts if the active phase halts on failure.
    pub fn error(&self, outcome: Outcome) {
        self.ctx.error(outcome);
    }

    // === Assertions ===

    /// Soft checks: failures are recorded and the test continues.
    pub fn assert(&self) -> Checks<'_> {
        Checks::soft(self)
    }

    /// Hard checks: the first failure stops the sub-test.
    pub fn require(&self) -> Checks<'_> {
        Checks::hard(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_provider_core::{MemorySink, ReportScope};
    use std::sync::Arc;

    fn run_body(body: impl FnOnce(&T)) -> TestResult {
        let sink = Arc::new(MemorySink::new());
        let scope = ReportScope::for_test("test_handle", "Handle::test_handle", sink);
        scope.enter(ExecutionContext::BeforeEach).unwrap();
        scope
            .run_phase(ExecutionContext::Test, |ctx| body(&T::new(ctx.clone())))
            .unwrap();
        scope.finalize().unwrap().unwrap()
    }

    #[test]
    fn test_metadata_lands_on_result() {
        let result = run_body(|t| {
            t.title("Readable title");
            t.description("does things");
            t.epic("Payments");
            t.severity(Severity::Critical);
            t.tags(&["smoke", "api"]);
            t.issue("https://tracker/1", Some("BUG-1".into()));
            t.parameter("region", "eu");
            t.flaky();
        });

        assert_eq!(result.name, "Readable title");
        assert_eq!(result.description.as_deref(), Some("does things"));
        let label = |name: &str| {
            result
                .labels
                .iter()
                .filter(|l| l.name == name)
                .map(|l| l.value.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(label("epic"), vec!["Payments"]);
        assert_eq!(label("severity"), vec!["critical"]);
        assert_eq!(label("tag"), vec!["smoke", "api"]);
        assert_eq!(result.links[0].r#type, Some(LinkType::Issue));
        assert_eq!(result.parameters[0].value, "eu");
        assert_eq!(result.status, Status::Passed);
        assert_eq!(result.status_details.unwrap().flaky, Some(true));
    }

    #[test]
    fn test_bdd_steps_are_prefixed() {
        let result = run_body(|t| {
            let total = t.given("two numbers", |_| 2 + 2);
            t.then("the sum is four", |t| {
                if total != Some(4) {
                    t.fail("bad sum");
                }
            });
        });
        let names: Vec<_> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Given two numbers", "Then the sum is four"]);
        assert_eq!(result.status, Status::Passed);
    }

    #[test]
    fn test_fail_now_stops_body_skip_marks_skipped() {
        let mut after_fail = false;
        let result = run_body(|t| {
            t.fail_now("stop here");
            after_fail = true;
        });
        assert!(!after_fail);
        assert_eq!(result.status, Status::Failed);

        let result = run_body(|t| t.skip("not on this platform"));
        assert_eq!(result.status, Status::Skipped);
        assert_eq!(
            result.status_details.unwrap().message.as_deref(),
            Some("not on this platform")
        );
    }

    #[test]
    fn test_async_step_through_handle() {
        let result = run_body(|t| {
            t.async_step("background", |t| {
                t.step_parameter("attempt", 1);
                t.step("inner", |_| {});
            });
        });
        let step = &result.steps[0];
        assert_eq!(step.name, "background");
        assert_eq!(step.parameters[0].name, "attempt");
        assert_eq!(step.steps[0].name, "inner");
    }
}
