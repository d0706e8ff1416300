//! Runner and writer configuration.
//!
//! Configuration is an explicit value handed to the writer and runner when
//! they are built; nothing is read from process-wide state after that.

use std::path::PathBuf;

use crate::error::{AllureError, AllureResult};

/// Default directory for Allure results.
pub const DEFAULT_RESULTS_DIR: &str = "allure-results";

/// Environment variable naming the directory that holds the results folder.
pub const OUTPUT_PATH_VAR: &str = "ALLURE_OUTPUT_PATH";

/// Environment variable naming the results folder itself.
pub const OUTPUT_FOLDER_VAR: &str = "ALLURE_OUTPUT_FOLDER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllureConfig {
    /// Directory where results are written.
    pub results_dir: PathBuf,
    /// Whether to wipe the results directory when the writer is initialized.
    pub clean_results: bool,
    /// Whether sub-tests of a suite run on parallel threads.
    pub parallel: bool,
}

impl Default for AllureConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            clean_results: false,
            parallel: true,
        }
    }
}

impl AllureConfig {
    pub fn builder() -> AllureConfigBuilder {
        AllureConfigBuilder::default()
    }

    /// Builds a configuration from `ALLURE_OUTPUT_PATH` and
    /// `ALLURE_OUTPUT_FOLDER`.
    pub fn from_env() -> AllureResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AllureConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AllureResult<Self> {
        let base = lookup(OUTPUT_PATH_VAR).unwrap_or_else(|| ".".to_string());
        let folder = lookup(OUTPUT_FOLDER_VAR).unwrap_or_else(|| DEFAULT_RESULTS_DIR.to_string());
        if folder.trim().is_empty() {
            return Err(AllureError::configuration(format!(
                "{OUTPUT_FOLDER_VAR} must not be empty"
            )));
        }
        Ok(Self {
            results_dir: PathBuf::from(base).join(folder),
            ..Self::default()
        })
    }
}

/// Builder for [`AllureConfig`].
#[derive(Debug, Default)]
pub struct AllureConfigBuilder {
    config: AllureConfig,
}

impl AllureConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.results_dir = path.into();
        self
    }

    pub fn clean_results(mut self, clean: bool) -> Self {
        self.config.clean_results = clean;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn build(self) -> AllureResult<AllureConfig> {
        if self.config.results_dir.as_os_str().is_empty() {
            return Err(AllureError::configuration("results directory is empty"));
        }
        Ok(self.config)
    }
}
