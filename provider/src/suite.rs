//! Suite registration.
//!
//! A suite lists its test methods and lifecycle hooks in a [`Registry`]
//! instead of being inspected at run time. `#[allure_suite]` generates the
//! registry from an impl block; it can also be written by hand.

use std::fmt;
use std::sync::Arc;

use crate::t::T;

/// Naming convention for test methods.
pub const TEST_PREFIX: &str = "test";

/// Callable test body or hook.
pub type Hook<S> = Arc<dyn Fn(&S, &T) + Send + Sync>;

/// A named test method of a suite.
pub struct TestMethod<S> {
    name: String,
    body: Hook<S>,
}

impl<S> TestMethod<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, suite: &S, t: &T) {
        (self.body)(suite, t)
    }
}

impl<S> fmt::Debug for TestMethod<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod").field("name", &self.name).finish()
    }
}

/// Registration table of a suite: its tests and optional hooks.
pub struct Registry<S> {
    tests: Vec<TestMethod<S>>,
    before_all: Option<Hook<S>>,
    before_each: Option<Hook<S>>,
    after_each: Option<Hook<S>>,
    after_all: Option<Hook<S>>,
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            tests: Vec::new(),
            before_all: None,
            before_each: None,
            after_each: None,
            after_all: None,
        }
    }

    /// Registers a test method. Names that do not start with `test`, or that
    /// are already registered, are ignored with a warning.
    pub fn test<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&S, &T) + Send + Sync + 'static,
    {
        let name = name.into();
        if !name.starts_with(TEST_PREFIX) {
            tracing::warn!(test = %name, "ignoring test without the `{TEST_PREFIX}` prefix");
            return self;
        }
        if self.tests.iter().any(|t| t.name == name) {
            tracing::warn!(test = %name, "ignoring duplicate test registration");
            return self;
        }
        self.tests.push(TestMethod {
            name,
            body: Arc::new(body),
        });
        self
    }

    pub fn before_all<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &T) + Send + Sync + 'static,
    {
        self.before_all = Some(Arc::new(hook));
        self
    }

    pub fn before_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &T) + Send + Sync + 'static,
    {
        self.before_each = Some(Arc::new(hook));
        self
    }

    pub fn after_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &T) + Send + Sync + 'static,
    {
        self.after_each = Some(Arc::new(hook));
        self
    }

    pub fn after_all<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &T) + Send + Sync + 'static,
    {
        self.after_all = Some(Arc::new(hook));
        self
    }

    pub fn tests(&self) -> &[TestMethod<S>] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn before_all_hook(&self) -> Option<&Hook<S>> {
        self.before_all.as_ref()
    }

    pub fn before_each_hook(&self) -> Option<&Hook<S>> {
        self.before_each.as_ref()
    }

    pub fn after_each_hook(&self) -> Option<&Hook<S>> {
        self.after_each.as_ref()
    }

    pub fn after_all_hook(&self) -> Option<&Hook<S>> {
        self.after_all.as_ref()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tests", &self.tests)
            .field("before_all", &self.before_all.is_some())
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("after_all", &self.after_all.is_some())
            .finish()
    }
}

/// A group of tests sharing lifecycle hooks.
pub trait Suite: Sync + Sized + 'static {
    /// Tests and hooks of this suite.
    fn registry() -> Registry<Self>;

    /// Name used for the suite container and the `suite` label.
    fn suite_name(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    impl Sample {
        fn test_one(&self, _t: &T) {}
    }

    impl Suite for Sample {
        fn registry() -> Registry<Self> {
            Registry::new()
                .test("test_one", Self::test_one)
                .test("helper", |_, _| {})
                .test("test_one", Self::test_one)
                .before_each(|_, _| {})
        }
    }

    #[test]
    fn test_registry_filters_names() {
        let registry = Sample::registry();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tests()[0].name(), "test_one");
        assert!(registry.before_each_hook().is_some());
        assert!(registry.after_all_hook().is_none());
    }

    #[test]
    fn test_default_suite_name_is_type_name() {
        assert_eq!(Sample.suite_name(), "Sample");
    }
}
