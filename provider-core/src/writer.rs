//! Persistence of finished results, containers and attachment payloads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::AllureConfig;
use crate::enums::ContentType;
use crate::error::{AllureError, AllureResult};
use crate::model::{Attachment, Parameter, TestResult, TestResultContainer};
use crate::sync::lock;

/// Destination for finished report entities.
///
/// The runner calls `persist_result` exactly once per finished result and
/// `persist_container` once per non-empty container.
pub trait ResultSink: Send + Sync {
    fn persist_result(&self, result: &TestResult) -> AllureResult<()>;

    fn persist_container(&self, container: &TestResultContainer) -> AllureResult<()>;

    /// Stores an attachment payload and returns the reference to record.
    fn write_attachment(
        &self,
        name: &str,
        content: &[u8],
        content_type: ContentType,
    ) -> AllureResult<Attachment>;
}

/// File name of an attachment payload: `{uuid}-attachment{ext}`.
pub fn attachment_file_name(uuid: &str, content_type: ContentType) -> String {
    format!("{}-attachment{}", uuid, content_type.extension())
}

/// Writes Allure JSON files into a results directory.
#[derive(Debug, Clone)]
pub struct AllureWriter {
    results_dir: PathBuf,
}

impl AllureWriter {
    pub fn with_results_dir(path: impl AsRef<Path>) -> Self {
        Self {
            results_dir: path.as_ref().to_path_buf(),
        }
    }

    /// Creates the writer described by `config` and prepares its directory.
    pub fn from_config(config: &AllureConfig) -> AllureResult<Self> {
        let writer = Self::with_results_dir(&config.results_dir);
        writer.init(config.clean_results)?;
        Ok(writer)
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Initializes the results directory, optionally cleaning it first.
    pub fn init(&self, clean: bool) -> AllureResult<()> {
        if clean && self.results_dir.exists() {
            fs::remove_dir_all(&self.results_dir)?;
        }
        fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }

    fn ensure_dir(&self) -> AllureResult<()> {
        if !self.results_dir.exists() {
            fs::create_dir_all(&self.results_dir)?;
        }
        Ok(())
    }

    pub fn write_test_result(&self, result: &TestResult) -> AllureResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.results_dir.join(format!("{}-result.json", result.uuid));
        fs::write(&path, serde_json::to_string_pretty(result)?)?;
        Ok(path)
    }

    pub fn write_container(&self, container: &TestResultContainer) -> AllureResult<PathBuf> {
        self.ensure_dir()?;
        let path = self
            .results_dir
            .join(format!("{}-container.json", container.uuid));
        fs::write(&path, serde_json::to_string_pretty(container)?)?;
        Ok(path)
    }
}

impl ResultSink for AllureWriter {
    fn persist_result(&self, result: &TestResult) -> AllureResult<()> {
        self.write_test_result(result).map(|_| ())
    }

    fn persist_container(&self, container: &TestResultContainer) -> AllureResult<()> {
        self.write_container(container).map(|_| ())
    }

    fn write_attachment(
        &self,
        name: &str,
        content: &[u8],
        content_type: ContentType,
    ) -> AllureResult<Attachment> {
        if name.is_empty() {
            return Err(AllureError::invalid_attachment("attachment name is empty"));
        }
        self.ensure_dir()?;
        let source = attachment_file_name(&generate_uuid(), content_type);
        fs::write(self.results_dir.join(&source), content)?;
        Ok(Attachment::new(
            name,
            source,
            Some(content_type.as_mime().to_string()),
        ))
    }
}

/// Keeps everything in memory. Useful for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<TestResult>>,
    containers: Mutex<Vec<TestResultContainer>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TestResult> {
        lock(&self.results).clone()
    }

    pub fn containers(&self) -> Vec<TestResultContainer> {
        lock(&self.containers).clone()
    }

    /// Payload of an attachment by its source file name.
    pub fn payload(&self, source: &str) -> Option<Vec<u8>> {
        lock(&self.payloads).get(source).cloned()
    }

    pub fn result_named(&self, name: &str) -> Option<TestResult> {
        lock(&self.results).iter().find(|r| r.name == name).cloned()
    }
}

impl ResultSink for MemorySink {
    fn persist_result(&self, result: &TestResult) -> AllureResult<()> {
        lock(&self.results).push(result.clone());
        Ok(())
    }

    fn persist_container(&self, container: &TestResultContainer) -> AllureResult<()> {
        lock(&self.containers).push(container.clone());
        Ok(())
    }

    fn write_attachment(
        &self,
        name: &str,
        content: &[u8],
        content_type: ContentType,
    ) -> AllureResult<Attachment> {
        if name.is_empty() {
            return Err(AllureError::invalid_attachment("attachment name is empty"));
        }
        let source = attachment_file_name(&generate_uuid(), content_type);
        lock(&self.payloads).insert(source.clone(), content.to_vec());
        Ok(Attachment::new(
            name,
            source,
            Some(content_type.as_mime().to_string()),
        ))
    }
}

/// Generates a new UUID v4 string.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Computes the history ID for a test based on its full name and parameters.
pub fn compute_history_id(full_name: &str, parameters: &[Parameter]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(full_name.as_bytes());
    for param in parameters.iter().filter(|p| !p.excluded.unwrap_or(false)) {
        hasher.update(param.name.as_bytes());
        hasher.update(param.value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Status;
    use crate::model::{FixtureResult, StepResult};
    use crate::enums::Stage;
    use tempfile::tempdir;

    #[test]
    fn test_write_test_result() {
        let dir = tempdir().unwrap();
        let writer = AllureWriter::with_results_dir(dir.path());
        writer.init(true).unwrap();

        let mut result = TestResult::new("test-123".to_string(), "My Test".to_string());
        result.finish();

        let path = writer.write_test_result(&result).unwrap();
        assert!(path.ends_with("test-123-result.json"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"status\": \"passed\""));
    }

    #[test]
    fn test_write_container() {
        let dir = tempdir().unwrap();
        let writer = AllureWriter::with_results_dir(dir.path());

        let mut container = TestResultContainer::new("c-1".to_string());
        container.add_child("t-1".to_string());
        container.befores.push(FixtureResult::from(StepResult {
            uuid: None,
            name: "before_all".to_string(),
            status: Status::Passed,
            status_details: None,
            stage: Stage::Finished,
            steps: Vec::new(),
            attachments: Vec::new(),
            parameters: Vec::new(),
            start: 0,
            stop: 1,
        }));
        writer.persist_container(&container).unwrap();

        let path = dir.path().join("c-1-container.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["children"][0], "t-1");
        assert_eq!(json["befores"][0]["name"], "before_all");
    }

    #[test]
    fn test_attachment_file_naming() {
        let dir = tempdir().unwrap();
        let writer = AllureWriter::with_results_dir(dir.path());

        let attachment = writer
            .write_attachment("log", b"hello", ContentType::Text)
            .unwrap();
        assert!(attachment.source.ends_with("-attachment.txt"));
        assert_eq!(attachment.source.len(), 36 + "-attachment.txt".len());
        assert_eq!(attachment.r#type.as_deref(), Some("text/plain"));
        assert_eq!(
            fs::read_to_string(dir.path().join(&attachment.source)).unwrap(),
            "hello"
        );

        let raw = writer
            .write_attachment("dump", &[0, 1], ContentType::Binary)
            .unwrap();
        assert!(raw.source.ends_with("-attachment"));
    }

    #[test]
    fn test_empty_attachment_name_rejected() {
        let sink = MemorySink::new();
        let err = sink
            .write_attachment("", b"x", ContentType::Text)
            .unwrap_err();
        assert!(matches!(err, AllureError::InvalidAttachment(_)));
    }

    #[test]
    fn test_memory_sink_keeps_payloads() {
        let sink = MemorySink::new();
        let attachment = sink
            .write_attachment("body", b"{}", ContentType::Json)
            .unwrap();
        assert_eq!(sink.payload(&attachment.source), Some(b"{}".to_vec()));
        assert!(sink.results().is_empty());
    }

    #[test]
    fn test_from_config_cleans_directory() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("stale.json");
        fs::write(&stale, "{}").unwrap();

        let config = AllureConfig::builder()
            .results_dir(dir.path())
            .clean_results(true)
            .build()
            .unwrap();
        let writer = AllureWriter::from_config(&config).unwrap();
        assert!(writer.results_dir().exists());
        assert!(!stale.exists());
    }

    #[test]
    fn test_compute_history_id() {
        let params = vec![Parameter::new("a", "1"), Parameter::new("b", "2")];
        let id1 = compute_history_id("suite::login", &params);
        assert_eq!(id1, compute_history_id("suite::login", &params));
        assert_ne!(id1, compute_history_id("suite::logout", &params));

        let mut with_excluded = params.clone();
        with_excluded.push(Parameter::excluded("timestamp", "12345"));
        assert_eq!(id1, compute_history_id("suite::login", &with_excluded));
    }
}
