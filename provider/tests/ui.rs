//! Compile tests for `#[allure_suite]` as seen by a downstream crate.
//!
//! Rejected inputs are covered by unit tests in the macro crate.

#[test]
fn ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass/*.rs");
}
