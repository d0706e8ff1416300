//! # Allure Provider
//!
//! Runs test suites with lifecycle hooks and records them as
//! [Allure](https://allurereport.org/) results:
//!
//! - Suites with `before_all`, `before_each`, `after_each` and `after_all` hooks
//! - Sub-tests running in parallel, each on its own thread
//! - Nested steps, async steps joined at phase boundaries, BDD-style steps
//! - Parameters, attachments, labels and links
//! - Soft (`t.assert()`) and hard (`t.require()`) assertions recorded as steps
//!
//! ## Basic Usage
//!
//! ```ignore
//! use allure_provider::prelude::*;
//!
//! #[derive(Default)]
//! struct CheckoutSuite;
//!
//! #[allure_suite("Checkout")]
//! impl CheckoutSuite {
//!     fn before_each(&self, t: &T) {
//!         t.step("seed cart", |_| {});
//!     }
//!
//!     fn test_total(&self, t: &T) {
//!         t.severity(Severity::Critical);
//!         t.step("add items", |t| {
//!             t.step_parameter("count", 2);
//!         });
//!         t.require().equal(42, 40 + 2);
//!     }
//!
//!     fn test_payment(&self, t: &T) {
//!         t.async_step("charge card", |t| t.log_step("authorized", Status::Passed));
//!     }
//! }
//!
//! #[test]
//! fn checkout() {
//!     allure_provider::run(&CheckoutSuite).unwrap().assert_passed();
//! }
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use std::sync::Arc;
//! use allure_provider::{AllureConfig, AllureWriter, Runner};
//!
//! let config = AllureConfig::builder()
//!     .results_dir("target/allure-results")
//!     .clean_results(true)
//!     .parallel(false)
//!     .build()?;
//! let runner = Runner::from_config(config)?;
//! ```

pub mod assert;
pub mod runner;
pub mod suite;
pub mod t;

// Re-export everything from the core crate
pub use allure_provider_core::*;

pub use allure_provider_macros::allure_suite;

pub use assert::Checks;
pub use runner::{Runner, SuiteReport, TestReport};
pub use suite::{Hook, Registry, Suite, TestMethod, TEST_PREFIX};
pub use t::T;

/// Runs `suite` with the configuration found in the environment and writes
/// its results to disk.
pub fn run<S: Suite>(suite: &S) -> AllureResult<SuiteReport> {
    Ok(Runner::from_env()?.run(suite))
}

/// Prelude module for convenient imports.
///
/// Use `use allure_provider::prelude::*;` to import commonly used items.
pub mod prelude {
    pub use allure_provider_macros::allure_suite;

    pub use crate::runner::{Runner, SuiteReport};
    pub use crate::suite::{Registry, Suite};
    pub use crate::t::T;

    pub use allure_provider_core::{
        AllureConfig, ContentType, LinkType, Outcome, Severity, Status,
    };
}
