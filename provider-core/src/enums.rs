//! Status, stage and classification enums shared by every report entity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a test, fixture or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Status {
    /// Completed without any recorded failure
    Passed,
    /// A checked condition did not hold (product defect)
    Failed,
    /// An unexpected fault such as a panic (test defect)
    Broken,
    /// Deliberately not executed
    Skipped,
    /// Not resolved yet
    #[default]
    Unknown,
}

impl Status {
    /// Severity rank used when merging statuses.
    ///
    /// Skipped and Unknown rank lowest so that they never worsen a parent.
    pub fn rank(self) -> u8 {
        match self {
            Status::Unknown | Status::Skipped => 0,
            Status::Passed => 1,
            Status::Broken => 2,
            Status::Failed => 3,
        }
    }

    /// Merges `other` into `self` and returns the resulting status.
    ///
    /// A skipped receiver stays skipped regardless of `other`. Otherwise the
    /// higher ranked status wins.
    pub fn worsen(self, other: Status) -> Status {
        if self == Status::Skipped {
            return Status::Skipped;
        }
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Applies a status reported directly on an entity (not inherited from a
    /// child). Unlike [`Status::worsen`], an explicit skip lands on anything
    /// that has not already failed.
    pub fn record(self, incoming: Status) -> Status {
        if incoming == Status::Skipped && !self.is_failure() {
            return Status::Skipped;
        }
        self.worsen(incoming)
    }

    /// Whether this status represents a failure of either kind.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed | Status::Broken)
    }

    /// Whether the status has been resolved to a final value.
    pub fn is_resolved(self) -> bool {
        self != Status::Unknown
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passed => write!(f, "passed"),
            Status::Failed => write!(f, "failed"),
            Status::Broken => write!(f, "broken"),
            Status::Skipped => write!(f, "skipped"),
            Status::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lifecycle stage of a report entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Stage {
    /// Registered but not started
    Scheduled,
    /// Currently open
    Running,
    /// Closed with a stop time
    #[default]
    Finished,
    /// Stopped before completion
    Interrupted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Scheduled => write!(f, "scheduled"),
            Stage::Running => write!(f, "running"),
            Stage::Finished => write!(f, "finished"),
            Stage::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Test severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Severity {
    Blocker,
    Critical,
    #[default]
    Normal,
    Minor,
    Trivial,
}

impl Severity {
    /// Returns the label value used in Allure results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::Critical => "critical",
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Trivial => "trivial",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum LinkType {
    #[default]
    #[serde(rename = "link")]
    Default,
    /// Issue tracker entry
    Issue,
    /// Test management system entry
    Tms,
}

/// How a parameter value is displayed in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ParameterMode {
    #[default]
    Default,
    Hidden,
    Masked,
}

/// MIME table for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ContentType {
    #[default]
    Text,
    Json,
    Xml,
    Html,
    Csv,
    Tsv,
    Css,
    Uri,
    Svg,
    Png,
    Jpeg,
    Gif,
    Webm,
    Mp4,
    Pdf,
    Zip,
    /// Opaque bytes
    Binary,
}

impl ContentType {
    /// Returns the MIME type string.
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Json => "application/json",
            ContentType::Xml => "application/xml",
            ContentType::Html => "text/html",
            ContentType::Csv => "text/csv",
            ContentType::Tsv => "text/tab-separated-values",
            ContentType::Css => "text/css",
            ContentType::Uri => "text/uri-list",
            ContentType::Svg => "image/svg+xml",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Gif => "image/gif",
            ContentType::Webm => "video/webm",
            ContentType::Mp4 => "video/mp4",
            ContentType::Pdf => "application/pdf",
            ContentType::Zip => "application/zip",
            ContentType::Binary => "application/octet-stream",
        }
    }

    /// Returns the attachment file extension, including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Text => ".txt",
            ContentType::Json => ".json",
            ContentType::Xml => ".xml",
            ContentType::Html => ".html",
            ContentType::Csv => ".csv",
            ContentType::Tsv => ".tsv",
            ContentType::Css => ".css",
            ContentType::Uri => ".uri",
            ContentType::Svg => ".svg",
            ContentType::Png => ".png",
            ContentType::Jpeg => ".jpg",
            ContentType::Gif => ".gif",
            ContentType::Webm => ".webm",
            ContentType::Mp4 => ".mp4",
            ContentType::Pdf => ".pdf",
            ContentType::Zip => ".zip",
            ContentType::Binary => "",
        }
    }

    /// Looks up a content type by MIME string, ignoring parameters such as
    /// `; charset=utf-8`.
    pub fn from_mime(mime: &str) -> Option<ContentType> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        let ct = match essence.to_ascii_lowercase().as_str() {
            "text/plain" => ContentType::Text,
            "application/json" => ContentType::Json,
            "application/xml" | "text/xml" => ContentType::Xml,
            "text/html" => ContentType::Html,
            "text/csv" => ContentType::Csv,
            "text/tab-separated-values" => ContentType::Tsv,
            "text/css" => ContentType::Css,
            "text/uri-list" => ContentType::Uri,
            "image/svg+xml" => ContentType::Svg,
            "image/png" => ContentType::Png,
            "image/jpeg" => ContentType::Jpeg,
            "image/gif" => ContentType::Gif,
            "video/webm" => ContentType::Webm,
            "video/mp4" => ContentType::Mp4,
            "application/pdf" => ContentType::Pdf,
            "application/zip" => ContentType::Zip,
            "application/octet-stream" => ContentType::Binary,
            _ => return None,
        };
        Some(ct)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Reserved label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LabelName {
    #[serde(rename = "AS_ID")]
    AllureId,
    #[serde(rename = "suite")]
    Suite,
    #[serde(rename = "parentSuite")]
    ParentSuite,
    #[serde(rename = "subSuite")]
    SubSuite,
    #[serde(rename = "epic")]
    Epic,
    #[serde(rename = "feature")]
    Feature,
    #[serde(rename = "story")]
    Story,
    #[serde(rename = "severity")]
    Severity,
    #[serde(rename = "tag")]
    Tag,
    #[serde(rename = "owner")]
    Owner,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "thread")]
    Thread,
    #[serde(rename = "testMethod")]
    TestMethod,
    #[serde(rename = "testClass")]
    TestClass,
    #[serde(rename = "package")]
    Package,
    #[serde(rename = "framework")]
    Framework,
    #[serde(rename = "language")]
    Language,
}

impl LabelName {
    /// Returns the string name used in Allure JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelName::AllureId => "AS_ID",
            LabelName::Suite => "suite",
            LabelName::ParentSuite => "parentSuite",
            LabelName::SubSuite => "subSuite",
            LabelName::Epic => "epic",
            LabelName::Feature => "feature",
            LabelName::Story => "story",
            LabelName::Severity => "severity",
            LabelName::Tag => "tag",
            LabelName::Owner => "owner",
            LabelName::Host => "host",
            LabelName::Thread => "thread",
            LabelName::TestMethod => "testMethod",
            LabelName::TestClass => "testClass",
            LabelName::Package => "package",
            LabelName::Framework => "framework",
            LabelName::Language => "language",
        }
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Broken).unwrap(), "\"broken\"");
        assert_eq!(serde_json::to_string(&Status::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn test_worsen_prefers_failures() {
        assert_eq!(Status::Passed.worsen(Status::Failed), Status::Failed);
        assert_eq!(Status::Passed.worsen(Status::Broken), Status::Broken);
        assert_eq!(Status::Broken.worsen(Status::Failed), Status::Failed);
        assert_eq!(Status::Failed.worsen(Status::Broken), Status::Failed);
        assert_eq!(Status::Unknown.worsen(Status::Passed), Status::Passed);
    }

    #[test]
    fn test_worsen_skipped_is_sticky_on_receiver_only() {
        assert_eq!(Status::Skipped.worsen(Status::Failed), Status::Skipped);
        assert_eq!(Status::Passed.worsen(Status::Skipped), Status::Passed);
        assert_eq!(Status::Unknown.worsen(Status::Skipped), Status::Unknown);
    }

    #[test]
    fn test_record_allows_explicit_skip() {
        assert_eq!(Status::Unknown.record(Status::Skipped), Status::Skipped);
        assert_eq!(Status::Passed.record(Status::Skipped), Status::Skipped);
        assert_eq!(Status::Failed.record(Status::Skipped), Status::Failed);
        assert_eq!(Status::Skipped.record(Status::Broken), Status::Skipped);
    }

    #[test]
    fn test_content_type_table() {
        assert_eq!(ContentType::Png.as_mime(), "image/png");
        assert_eq!(ContentType::Jpeg.extension(), ".jpg");
        assert_eq!(ContentType::Binary.extension(), "");
        assert_eq!(
            ContentType::from_mime("application/json; charset=utf-8"),
            Some(ContentType::Json)
        );
        assert_eq!(ContentType::from_mime("application/x-unknown"), None);
    }

    #[test]
    fn test_label_name_as_str() {
        assert_eq!(LabelName::AllureId.as_str(), "AS_ID");
        assert_eq!(LabelName::ParentSuite.to_string(), "parentSuite");
    }
}
