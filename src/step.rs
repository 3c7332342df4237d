//! Step expression parsing
//!
//! A step is written as a compact call, `name(arg, arg, ...)`, where every
//! argument is an integer literal. Step text is hand-authored, so matching is
//! lenient: the call is matched as a prefix, whitespace and empty argument
//! slots are tolerated, and anything after the closing parenthesis is ignored.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::common::error::StepError;

/// A call at the start of a step: name, then everything up to the first `)`
static STEP_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)\s*\((.*?)\)").expect("Invalid step regex"));

/// Every whole-word call in a comma-joined step list
static STEP_LIST_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\([^)]*\)").expect("Invalid step list regex"));

/// A parsed step: command name plus ordered integer parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: String,
    pub params: Vec<i64>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.command)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

/// Parse a step expression into a command name and its parameters
pub fn parse_step(text: &str) -> Result<Step, StepError> {
    let caps = STEP_CALL
        .captures(text)
        .ok_or_else(|| StepError::Malformed(text.to_string()))?;

    let rest = &text[caps.get(0).map_or(text.len(), |m| m.end())..];
    if !rest.trim().is_empty() {
        tracing::debug!(step = text, ignored = rest.trim(), "Ignoring text after call");
    }

    let params = caps[2]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<i64>().map_err(|_| StepError::Parameter {
                step: text.to_string(),
                param: p.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Step {
        command: caps[1].to_string(),
        params,
    })
}

/// Extract the individual calls from a comma-joined list of steps
///
/// `"setup(10), measure()"` yields `["setup(10)", "measure()"]`. Text that
/// is not part of a call is dropped.
pub fn parse_step_list(text: &str) -> Vec<String> {
    STEP_LIST_CALL
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_params() {
        let step = parse_step("setup_voltage(5, 2)").unwrap();
        assert_eq!(step.command, "setup_voltage");
        assert_eq!(step.params, vec![5, 2]);
    }

    #[test]
    fn test_parse_call_without_params() {
        let step = parse_step("measure()").unwrap();
        assert_eq!(step.command, "measure");
        assert!(step.params.is_empty());
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let step = parse_step("  power_on ( 1 ,  -3 ) ").unwrap();
        assert_eq!(step.command, "power_on");
        assert_eq!(step.params, vec![1, -3]);
    }

    #[test]
    fn test_parse_skips_empty_slots() {
        let step = parse_step("f(1,,2,)").unwrap();
        assert_eq!(step.params, vec![1, 2]);
    }

    #[test]
    fn test_parse_rejects_non_calls() {
        assert!(matches!(parse_step("bad step"), Err(StepError::Malformed(_))));
        assert!(matches!(parse_step("(1)"), Err(StepError::Malformed(_))));
        assert!(matches!(parse_step("f(1"), Err(StepError::Malformed(_))));
        assert!(matches!(parse_step("a-b(1)"), Err(StepError::Malformed(_))));
        assert!(matches!(parse_step(""), Err(StepError::Malformed(_))));
    }

    #[test]
    fn test_parse_ignores_text_after_call() {
        let step = parse_step("power_on(1) # warm up").unwrap();
        assert_eq!(step.command, "power_on");
        assert_eq!(step.params, vec![1]);

        let step = parse_step("setup_voltage(5, 1);").unwrap();
        assert_eq!(step.params, vec![5, 1]);

        // Only the first call of a line is taken
        assert_eq!(parse_step("f(1) g()").unwrap().command, "f");
    }

    #[test]
    fn test_parse_rejects_non_integer_params() {
        match parse_step("setup_voltage(5.5, 2)") {
            Err(StepError::Parameter { param, .. }) => assert_eq!(param, "5.5"),
            other => panic!("Expected Parameter error, got {:?}", other),
        }
    }

    #[test]
    fn test_display_is_canonical() {
        let step = parse_step("setup_voltage( 5 ,2 )").unwrap();
        assert_eq!(step.to_string(), "setup_voltage(5, 2)");
        assert_eq!(parse_step(&step.to_string()).unwrap(), step);
    }

    #[test]
    fn test_parse_step_list() {
        assert_eq!(
            parse_step_list("setup(10), measure()"),
            vec!["setup(10)".to_string(), "measure()".to_string()]
        );
        assert_eq!(
            parse_step_list("setup_voltage(5, 1),power_on()"),
            vec!["setup_voltage(5, 1)".to_string(), "power_on()".to_string()]
        );
        assert!(parse_step_list("").is_empty());
    }

    #[test]
    fn test_parse_step_list_drops_stray_text() {
        assert_eq!(
            parse_step_list("then bar(1), baz(2)"),
            vec!["bar(1)".to_string(), "baz(2)".to_string()]
        );
        assert_eq!(parse_step_list("power_on() ; measure() done"), vec!["power_on()", "measure()"]);
    }
}
