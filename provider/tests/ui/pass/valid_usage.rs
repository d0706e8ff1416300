// Suites only need `allure_provider`; the generated code refers to it by
// absolute path.
use allure_provider::prelude::*;

struct Payments;

#[allure_suite("Payments")]
impl Payments {
    fn before_all(&self, t: &T) {
        t.step("start gateway stub", |_| {});
    }

    fn before_each(&self, t: &T) {
        t.log_step("reset ledger", Status::Passed);
    }

    fn test_charge(&self, t: &T) {
        t.severity(Severity::Critical);
        t.step("charge card", |t| {
            t.step_parameter("amount", 10);
        });
        t.async_step("send receipt", |t| t.attach_text("receipt", "ok"));
        t.require().equal(10, 5 + 5);
    }

    fn test_refund(&self, t: &T) {
        t.when("a refund is requested", |t| t.assert().is_true(true));
    }

    fn after_all(&self, _t: &T) {}

    fn helper(&self) -> u32 {
        7
    }
}

struct Plain;

#[allure_suite]
impl Plain {
    fn test_nothing(&self, _t: &T) {}
}

fn main() {
    let _ = Payments.helper();
    let _ = Payments::registry();
    let _ = Plain.suite_name();
}
