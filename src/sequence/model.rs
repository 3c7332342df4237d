//! Sequence and test case types
//!
//! Field names follow the on-disk JSON layout, so a sequence file written by
//! other tooling round-trips without loss.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::Error;

/// One declarative test: identity, enable flag, ordered steps and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identity, unique within a sequence
    pub id: i64,
    /// Disabled tests are reported as skipped without running any step
    #[serde(
        rename = "check",
        serialize_with = "serialize_check",
        deserialize_with = "deserialize_check"
    )]
    pub enabled: bool,
    #[serde(rename = "testname")]
    pub name: String,
    /// Step expressions in execution order
    #[serde(default)]
    pub steps: Vec<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub units: String,
}

impl TestCase {
    /// Create an enabled test with no steps
    pub fn new(id: i64, name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            id,
            enabled: true,
            name: name.into(),
            steps: Vec::new(),
            min,
            max,
            units: String::new(),
        }
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Inclusive limit check; NaN never passes
    pub fn within_limits(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// The `check` flag is stored as 0/1 in sequence files
fn serialize_check<S: Serializer>(enabled: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*enabled))
}

fn deserialize_check<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Check {
        Int(i64),
        Bool(bool),
    }

    match Check::deserialize(deserializer)? {
        Check::Int(0) | Check::Bool(false) => Ok(false),
        Check::Int(1) | Check::Bool(true) => Ok(true),
        Check::Int(other) => Err(serde::de::Error::custom(format!(
            "check must be 0 or 1, got {}",
            other
        ))),
    }
}

/// Wrapper object holding the test array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TestList {
    #[serde(rename = "testarray", default)]
    tests: Vec<TestCase>,
}

/// A full test sequence with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub version: String,
    pub tests: Vec<TestCase>,
}

#[derive(Serialize, Deserialize)]
struct SequenceFile {
    #[serde(rename = "test sequence name")]
    name: String,
    #[serde(default)]
    version: String,
    testlist: TestList,
}

impl Serialize for Sequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SequenceFile {
            name: self.name.clone(),
            version: self.version.clone(),
            testlist: TestList {
                tests: self.tests.clone(),
            },
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let file = SequenceFile::deserialize(deserializer)?;
        Ok(Self {
            name: file.name,
            version: file.version,
            tests: file.testlist.tests,
        })
    }
}

impl Sequence {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tests: Vec::new(),
        }
    }

    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Find a test by id; the first match wins
    pub fn find(&self, id: i64) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.id == id)
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut TestCase> {
        self.tests.iter_mut().find(|t| t.id == id)
    }

    /// Number of tests that will actually run
    pub fn enabled_count(&self) -> usize {
        self.tests.iter().filter(|t| t.enabled).count()
    }

    /// One past the largest id in use (1 for an empty sequence)
    pub fn next_id(&self) -> crate::common::Result<i64> {
        let max = self.tests.iter().map(|t| t.id).max().unwrap_or(0).max(0);
        max.checked_add(1).ok_or(Error::NoFreeTestId { max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "test sequence name": "PSU bring-up",
        "version": "1.2",
        "testlist": { "testarray": [
            { "id": 1, "check": 1, "testname": "Rail 5V",
              "steps": ["setup_voltage(5, 1)", "power_on()"],
              "min": 4.9, "max": 5.1, "units": "V" },
            { "id": 2, "check": 0, "testname": "Rail 12V",
              "steps": ["setup_voltage(12, 2)"],
              "min": 11.5, "max": 12.5, "units": "V" }
        ]}
    }"#;

    #[test]
    fn test_deserialize_sequence_file() {
        let seq: Sequence = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(seq.name, "PSU bring-up");
        assert_eq!(seq.version, "1.2");
        assert_eq!(seq.tests.len(), 2);
        assert!(seq.tests[0].enabled);
        assert!(!seq.tests[1].enabled);
        assert_eq!(seq.tests[0].steps, vec!["setup_voltage(5, 1)", "power_on()"]);
        assert_eq!(seq.enabled_count(), 1);
    }

    #[test]
    fn test_serialize_uses_file_layout() {
        let seq: Sequence = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&seq).unwrap();
        assert_eq!(value["test sequence name"], "PSU bring-up");
        assert_eq!(value["testlist"]["testarray"][1]["check"], 0);
        assert_eq!(value["testlist"]["testarray"][0]["testname"], "Rail 5V");

        let back: Sequence = serde_json::from_value(value).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn test_check_rejects_other_values() {
        let json = r#"{ "id": 1, "check": 2, "testname": "x", "min": 0, "max": 1 }"#;
        assert!(serde_json::from_str::<TestCase>(json).is_err());
    }

    #[test]
    fn test_within_limits_is_inclusive() {
        let test = TestCase::new(1, "t", 1.0, 2.0);
        assert!(test.within_limits(1.0));
        assert!(test.within_limits(2.0));
        assert!(!test.within_limits(1.0 - f64::EPSILON));
        assert!(!test.within_limits(2.0 + 1e-9));
        assert!(!test.within_limits(f64::NAN));
    }

    #[test]
    fn test_find_first_match_wins() {
        let seq = Sequence::new("s", "1")
            .with_test(TestCase::new(7, "first", 0.0, 1.0))
            .with_test(TestCase::new(7, "second", 0.0, 1.0));
        assert_eq!(seq.find(7).unwrap().name, "first");
        assert!(seq.find(8).is_none());
        assert_eq!(seq.next_id().unwrap(), 8);
    }

    #[test]
    fn test_next_id_when_ids_exhausted() {
        assert_eq!(Sequence::new("s", "1").next_id().unwrap(), 1);

        let seq = Sequence::new("s", "1").with_test(TestCase::new(i64::MAX, "last", 0.0, 1.0));
        assert!(matches!(
            seq.next_id(),
            Err(Error::NoFreeTestId { max: i64::MAX })
        ));
    }
}
