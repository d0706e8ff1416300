//! Serialized Allure entities: test results, containers, steps and their parts.
//!
//! These are the shapes handed to a [`ResultSink`](crate::writer::ResultSink).
//! While a test runs, steps live in a flat [`StepArena`](crate::arena::StepArena)
//! and are only assembled into nested [`StepResult`]s when the owning entity is
//! finalized.

use serde::{Deserialize, Serialize};

use crate::enums::{LabelName, LinkType, ParameterMode, Stage, Status};

/// One test invocation, written to `{uuid}-result.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub uuid: String,

    /// MD5 of the full name and non-excluded parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,

    /// Display title
    pub name: String,

    /// Suite-qualified test name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,

    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    /// Milliseconds since the Unix epoch
    pub start: i64,

    pub stop: i64,
}

impl TestResult {
    /// Creates a running result with the given identity.
    pub fn new(uuid: String, name: String) -> Self {
        let now = current_time_ms();
        Self {
            uuid,
            history_id: None,
            name,
            full_name: None,
            description: None,
            status: Status::Unknown,
            status_details: None,
            stage: Stage::Running,
            steps: Vec::new(),
            attachments: Vec::new(),
            parameters: Vec::new(),
            labels: Vec::new(),
            links: Vec::new(),
            start: now,
            stop: now,
        }
    }

    pub fn add_label(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.labels.push(Label::new(name, value));
    }

    pub fn add_label_name(&mut self, name: LabelName, value: impl Into<String>) {
        self.add_label(name.as_str(), value);
    }

    pub fn add_link(&mut self, url: impl Into<String>, name: Option<String>, link_type: LinkType) {
        self.links.push(Link {
            name,
            url: url.into(),
            r#type: Some(link_type),
        });
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Records a status on the result without ever improving it.
    ///
    /// Details are kept from the first failure that actually changed the
    /// status, so the report shows the root cause rather than the last echo.
    pub fn worsen(&mut self, status: Status, details: Option<StatusDetails>) {
        let merged = self.status.record(status);
        if merged != self.status {
            self.status = merged;
            if details.is_some() {
                self.status_details = merge_details(self.status_details.take(), details);
            }
        } else if self.status_details.is_none() && status == merged {
            self.status_details = details;
        }
    }

    /// Closes the result: unresolved status becomes passed, stop time is set.
    pub fn finish(&mut self) {
        if !self.status.is_resolved() {
            self.status = Status::Passed;
        }
        self.stop = current_time_ms();
        self.stage = Stage::Finished;
    }
}

/// Keeps the flaky/muted/known flags of `current` when a new message arrives.
fn merge_details(
    current: Option<StatusDetails>,
    incoming: Option<StatusDetails>,
) -> Option<StatusDetails> {
    match (current, incoming) {
        (Some(current), Some(incoming)) => Some(StatusDetails {
            known: current.known.or(incoming.known),
            muted: current.muted.or(incoming.muted),
            flaky: current.flaky.or(incoming.flaky),
            message: incoming.message,
            trace: incoming.trace,
        }),
        (current, incoming) => incoming.or(current),
    }
}

/// Assembled step within a test or fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    pub name: String,

    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,

    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    pub start: i64,

    pub stop: i64,
}

/// Additional status information for results, fixtures and steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flaky: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl StatusDetails {
    /// Details carrying only a message and trace.
    pub fn with_message(message: Option<String>, trace: Option<String>) -> Option<Self> {
        if message.is_none() && trace.is_none() {
            return None;
        }
        Some(Self {
            message,
            trace,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn from_name(name: LabelName, value: impl Into<String>) -> Self {
        Self::new(name.as_str(), value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<LinkType>,
}

/// Named input of a test or step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    pub value: String,

    /// Excluded from history id calculation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ParameterMode>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            excluded: None,
            mode: None,
        }
    }

    /// A parameter ignored by history id calculation.
    pub fn excluded(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            excluded: Some(true),
            ..Self::new(name, value)
        }
    }

    /// A parameter whose value is masked in the report.
    pub fn masked(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mode: Some(ParameterMode::Masked),
            ..Self::new(name, value)
        }
    }
}

/// Reference to an attachment file stored next to the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,

    /// File name, `{uuid}-attachment{ext}`
    pub source: String,

    /// MIME type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            r#type: mime_type,
        }
    }
}

/// Groups setup and teardown fixtures around one or more results.
/// Written to `{uuid}-container.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultContainer {
    pub uuid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// UUIDs of the results this container wraps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub befores: Vec<FixtureResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub afters: Vec<FixtureResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,
}

impl TestResultContainer {
    /// Creates a container that starts now.
    pub fn new(uuid: String) -> Self {
        Self {
            uuid,
            name: None,
            children: Vec::new(),
            befores: Vec::new(),
            afters: Vec::new(),
            start: Some(current_time_ms()),
            stop: None,
        }
    }

    pub fn add_child(&mut self, test_uuid: String) {
        self.children.push(test_uuid);
    }

    /// True when there is nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.befores.is_empty() && self.afters.is_empty()
    }

    pub fn finish(&mut self) {
        self.stop = Some(current_time_ms());
    }
}

/// One hook invocation recorded in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureResult {
    pub name: String,

    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,

    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    pub start: i64,

    pub stop: i64,
}

impl From<StepResult> for FixtureResult {
    fn from(step: StepResult) -> Self {
        Self {
            name: step.name,
            status: step.status,
            status_details: step.status_details,
            stage: step.stage,
            steps: step.steps,
            attachments: step.attachments,
            parameters: step.parameters,
            start: step.start,
            stop: step.stop,
        }
    }
}

/// Returns the current time in milliseconds since Unix epoch.
pub fn current_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(message: &str) -> Option<StatusDetails> {
        StatusDetails::with_message(Some(message.to_string()), None)
    }

    #[test]
    fn test_result_starts_running() {
        let result = TestResult::new("uuid-1".to_string(), "login".to_string());
        assert_eq!(result.status, Status::Unknown);
        assert_eq!(result.stage, Stage::Running);
        assert!(result.stop >= result.start);
    }

    #[test]
    fn test_result_finish_resolves_unknown_to_passed() {
        let mut result = TestResult::new("uuid-1".to_string(), "login".to_string());
        result.finish();
        assert_eq!(result.status, Status::Passed);
        assert_eq!(result.stage, Stage::Finished);
    }

    #[test]
    fn test_result_worsen_keeps_first_root_cause() {
        let mut result = TestResult::new("uuid-1".to_string(), "login".to_string());
        result.worsen(Status::Broken, details("boom"));
        result.worsen(Status::Broken, details("echo"));
        assert_eq!(result.status, Status::Broken);
        assert_eq!(
            result.status_details.as_ref().unwrap().message.as_deref(),
            Some("boom")
        );

        result.worsen(Status::Failed, details("assertion"));
        assert_eq!(result.status, Status::Failed);
        assert_eq!(
            result.status_details.unwrap().message.as_deref(),
            Some("assertion")
        );
    }

    #[test]
    fn test_result_worsen_preserves_flags() {
        let mut result = TestResult::new("uuid-1".to_string(), "login".to_string());
        result.status_details = Some(StatusDetails {
            flaky: Some(true),
            ..Default::default()
        });
        result.worsen(Status::Failed, details("nope"));
        let details = result.status_details.unwrap();
        assert_eq!(details.flaky, Some(true));
        assert_eq!(details.message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_skipped_result_is_not_overwritten() {
        let mut result = TestResult::new("uuid-1".to_string(), "login".to_string());
        result.worsen(Status::Skipped, details("not today"));
        result.worsen(Status::Failed, details("teardown"));
        result.finish();
        assert_eq!(result.status, Status::Skipped);
    }

    #[test]
    fn test_container_emptiness() {
        let mut container = TestResultContainer::new("c-1".to_string());
        container.add_child("t-1".to_string());
        assert!(container.is_empty());

        container.afters.push(FixtureResult::from(StepResult {
            uuid: None,
            name: "after_each".to_string(),
            status: Status::Passed,
            status_details: None,
            stage: Stage::Finished,
            steps: Vec::new(),
            attachments: Vec::new(),
            parameters: Vec::new(),
            start: 1,
            stop: 2,
        }));
        assert!(!container.is_empty());
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let mut result = TestResult::new("uuid-123".to_string(), "My Test".to_string());
        result.full_name = Some("suite::my_test".to_string());
        result.add_label_name(LabelName::Suite, "suite");
        result.finish();

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"fullName\":\"suite::my_test\""));
        assert!(json.contains("\"status\":\"passed\""));
        assert!(!json.contains("statusDetails"));
    }
}
