//! Test sequences
//!
//! The declarative model the runner consumes, plus loading, validation and
//! the small set of edits a sequence editor needs (add, remove, toggle).

mod model;

pub use model::{Sequence, TestCase};

use std::collections::HashSet;
use std::path::Path;

use crate::common::error::SequenceLoadError;
use crate::common::{Error, Result};
use crate::step::parse_step;

/// A problem found while validating a sequence
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Issue {
    /// Test the issue belongs to, if any
    pub test_id: Option<i64>,
    pub message: String,
    /// Errors prevent loading; warnings are reported but tolerated
    pub fatal: bool,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.test_id {
            Some(id) => write!(f, "test {}: {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Load and validate a sequence file
///
/// Fatal issues (duplicate ids, inverted limits) reject the file. Steps that
/// will not parse are only warnings: the runner skips them at execution time.
pub fn load(path: &Path) -> std::result::Result<Sequence, SequenceLoadError> {
    let sequence = read(path)?;

    let issues = validate(&sequence);
    for issue in issues.iter().filter(|i| !i.fatal) {
        tracing::warn!(path = %path.display(), "{}", issue);
    }

    let fatal: Vec<String> = issues
        .iter()
        .filter(|i| i.fatal)
        .map(|i| i.to_string())
        .collect();
    if !fatal.is_empty() {
        return Err(SequenceLoadError::Invalid(fatal));
    }

    tracing::debug!(
        path = %path.display(),
        name = %sequence.name,
        tests = sequence.tests.len(),
        "Loaded sequence"
    );
    Ok(sequence)
}

/// Parse a sequence file without validating it
///
/// Editing commands use this so a file with problems can still be repaired.
pub fn read(path: &Path) -> std::result::Result<Sequence, SequenceLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| SequenceLoadError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| SequenceLoadError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write a sequence back to disk as pretty-printed JSON
pub fn save(sequence: &Sequence, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(sequence)?;
    std::fs::write(path, json + "\n")?;
    tracing::debug!(path = %path.display(), tests = sequence.tests.len(), "Saved sequence");
    Ok(())
}

/// Check the invariants the runner assumes but does not enforce
pub fn validate(sequence: &Sequence) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    if sequence.name.trim().is_empty() {
        issues.push(Issue {
            test_id: None,
            message: "sequence name is empty".to_string(),
            fatal: false,
        });
    }

    for test in &sequence.tests {
        if !seen.insert(test.id) {
            issues.push(Issue {
                test_id: Some(test.id),
                message: "duplicate test id".to_string(),
                fatal: true,
            });
        }

        if test.min.is_nan() || test.max.is_nan() {
            issues.push(Issue {
                test_id: Some(test.id),
                message: "limits must be numbers".to_string(),
                fatal: true,
            });
        } else if test.min > test.max {
            issues.push(Issue {
                test_id: Some(test.id),
                message: format!("min {} is greater than max {}", test.min, test.max),
                fatal: true,
            });
        }

        for step in &test.steps {
            if let Err(e) = parse_step(step) {
                issues.push(Issue {
                    test_id: Some(test.id),
                    message: e.to_string(),
                    fatal: false,
                });
            }
        }
    }

    issues
}

impl Sequence {
    /// Append a test, rejecting a duplicate id
    pub fn add_test(&mut self, test: TestCase) -> Result<()> {
        if self.find(test.id).is_some() {
            return Err(Error::DuplicateTestId { id: test.id });
        }
        self.tests.push(test);
        Ok(())
    }

    /// Remove a test by id and return it
    pub fn remove_test(&mut self, id: i64) -> Result<TestCase> {
        let index = self
            .tests
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::TestNotFound { id })?;
        Ok(self.tests.remove(index))
    }

    /// Set the enable flag of a test
    pub fn set_enabled(&mut self, id: i64, enabled: bool) -> Result<()> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        test.enabled = enabled;
        Ok(())
    }

    /// Flip the enable flag of a test, returning the new state
    pub fn toggle(&mut self, id: i64) -> Result<bool> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        test.enabled = !test.enabled;
        Ok(test.enabled)
    }

    /// Replace the steps of a test
    pub fn set_steps(&mut self, id: i64, steps: Vec<String>) -> Result<()> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        test.steps = steps;
        Ok(())
    }

    pub fn rename_test(&mut self, id: i64, name: impl Into<String>) -> Result<()> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        test.name = name.into();
        Ok(())
    }

    /// Replace both limits of a test, keeping `min <= max`
    pub fn set_limits(&mut self, id: i64, min: f64, max: f64) -> Result<()> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidLimits { id, min, max });
        }
        test.min = min;
        test.max = max;
        Ok(())
    }

    pub fn set_units(&mut self, id: i64, units: impl Into<String>) -> Result<()> {
        let test = self.find_mut(id).ok_or(Error::TestNotFound { id })?;
        test.units = units.into();
        Ok(())
    }
}
