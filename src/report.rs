//! Test results and the ordered result log

use std::fmt;

use serde::Serialize;

/// Terminal state of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Skipped,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A step that was skipped because it failed to parse, resolve or execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// Position of the step within its test
    pub index: usize,
    pub step: String,
    pub message: String,
}

/// Outcome record for one test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub id: i64,
    pub test_name: String,
    pub measured_value: Option<f64>,
    pub status: Outcome,
    pub units: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub step_errors: Vec<StepFailure>,
    /// Why no value was measured, when acquisition failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_error: Option<String>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == Outcome::Pass
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.measured_value {
            Some(v) => write!(
                f,
                "{}: {} (Measured: {} {})",
                self.test_name, self.status, v, self.units
            ),
            None => write!(
                f,
                "{}: {} (Measured: - {})",
                self.test_name, self.status, self.units
            ),
        }
    }
}

/// Append-only log of results in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultLog {
    entries: Vec<TestResult>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: TestResult) {
        self.entries.push(result);
    }

    pub fn entries(&self) -> &[TestResult] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable summary: one line per test
    pub fn summary(&self) -> String {
        let mut out = String::from("Test Results:\n");
        for result in &self.entries {
            out.push_str(&result.to_string());
            out.push('\n');
        }
        out
    }
}

impl<'a> IntoIterator for &'a ResultLog {
    type Item = &'a TestResult;
    type IntoIter = std::slice::Iter<'a, TestResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
