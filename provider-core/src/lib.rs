//! Allure Provider Core - report model and step engine.
//!
//! This crate records what a test run did in the Allure result model:
//!
//! - The Allure data model (results, containers, steps, attachments, ...)
//! - A flat step arena whose tree is assembled when a scope is finalized
//! - Per-cursor nesting stacks and the execution-context state machine
//! - The step engine, including async steps joined at phase boundaries
//! - Result sinks writing to the `allure-results` directory or to memory
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use allure_provider_core::{ExecutionContext, MemorySink, ReportScope, Status};
//!
//! let sink = Arc::new(MemorySink::new());
//! let scope = ReportScope::for_test("test_login", "Auth::test_login", sink.clone());
//!
//! scope.enter(ExecutionContext::BeforeEach).unwrap();
//! scope
//!     .run_phase(ExecutionContext::Test, |ctx| {
//!         ctx.with_new_step("open login page", |ctx| {
//!             ctx.add_parameter("browser", "firefox");
//!         });
//!     })
//!     .unwrap();
//! scope.enter(ExecutionContext::AfterEach).unwrap();
//!
//! let result = scope.finalize().unwrap().unwrap();
//! assert_eq!(result.status, Status::Passed);
//! assert_eq!(sink.results().len(), 1);
//! ```

pub mod arena;
pub mod config;
pub mod context;
pub mod enums;
pub mod error;
pub mod model;
pub mod outcome;
pub mod scope;
pub mod stack;
pub mod step;
pub mod sync;
pub mod writer;

// Re-exports for convenience
pub use arena::{Step, StepArena, StepId};
pub use config::{AllureConfig, AllureConfigBuilder, DEFAULT_RESULTS_DIR};
pub use context::{Bucket, ExecutionContext, PhaseMachine};
pub use enums::{ContentType, LabelName, LinkType, ParameterMode, Severity, Stage, Status};
pub use error::{AllureError, AllureResult};
pub use model::{
    Attachment, FixtureResult, Label, Link, Parameter, StatusDetails, StepResult, TestResult,
    TestResultContainer,
};
pub use outcome::{Halt, Outcome, MAX_MESSAGE_LEN};
pub use scope::{thread_name, TaskScope};
pub use stack::NestingStack;
pub use step::{ReportScope, StepCtx};
pub use writer::{compute_history_id, generate_uuid, AllureWriter, MemorySink, ResultSink};
