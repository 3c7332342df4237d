//! Console rendering of runs and sequences

use colored::Colorize;

use crate::report::{Outcome, ResultLog, StepFailure, TestResult};
use crate::runner::RunObserver;
use crate::sequence::{Sequence, TestCase};

/// Prints each test as it finishes
pub struct ConsoleObserver {
    verbose: bool,
    quiet: bool,
}

impl ConsoleObserver {
    /// `quiet` suppresses all output, for JSON mode
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }
}

impl RunObserver for ConsoleObserver {
    fn test_started(&mut self, test: &TestCase) {
        if self.quiet || !self.verbose {
            return;
        }
        println!(
            "  {} [{}] {} {}",
            "▶".cyan(),
            test.id,
            test.name.white(),
            format!("[{}, {}] {}", test.min, test.max, test.units).dimmed()
        );
        for step in &test.steps {
            println!("      {}", step.dimmed());
        }
    }

    fn step_failed(&mut self, _test: &TestCase, failure: &StepFailure) {
        if self.quiet {
            return;
        }
        println!(
            "    {} step {} skipped: {}",
            "!".yellow(),
            failure.index + 1,
            failure.message
        );
    }

    fn test_finished(&mut self, result: &TestResult) {
        if self.quiet {
            return;
        }
        println!("  {} {}", status_icon(result.status), describe(result));
        if let Some(err) = &result.acquisition_error {
            println!("    {} {}", "no measurement:".red(), err);
        }
    }
}

fn status_icon(status: Outcome) -> colored::ColoredString {
    match status {
        Outcome::Pass => "✓".green(),
        Outcome::Fail => "✗".red(),
        Outcome::Skipped => "-".dimmed(),
        Outcome::Cancelled => "⊘".yellow(),
    }
}

fn describe(result: &TestResult) -> String {
    let status = match result.status {
        Outcome::Pass => result.status.to_string().green(),
        Outcome::Fail => result.status.to_string().red(),
        Outcome::Skipped => result.status.to_string().dimmed(),
        Outcome::Cancelled => result.status.to_string().yellow(),
    };
    match result.measured_value {
        Some(v) => format!("{}: {} ({} {})", result.test_name, status, v, result.units),
        None => format!("{}: {}", result.test_name, status),
    }
}

/// Print pass/fail/skip counts after a run
pub fn print_totals(log: &ResultLog) {
    let count = |o: Outcome| log.iter().filter(|r| r.status == o).count();
    let (pass, fail, skipped, cancelled) = (
        log.iter().filter(|r| r.passed()).count(),
        count(Outcome::Fail),
        count(Outcome::Skipped),
        count(Outcome::Cancelled),
    );

    let mut line = format!(
        "{} passed, {} failed, {} skipped",
        pass.to_string().green(),
        fail.to_string().red(),
        skipped
    );
    if cancelled > 0 {
        line.push_str(&format!(", {} cancelled", cancelled.to_string().yellow()));
    }

    if fail == 0 && cancelled == 0 {
        println!("\n{} {}\n", "✓".green().bold(), line);
    } else {
        println!("\n{} {}\n", "✗".red().bold(), line);
    }
}

/// Print a sequence as a table
pub fn print_sequence(sequence: &Sequence) {
    println!(
        "{} {} {}",
        "Sequence:".blue().bold(),
        sequence.name.white().bold(),
        format!("(version {})", sequence.version).dimmed()
    );

    for test in &sequence.tests {
        let check = if test.enabled {
            "✔".green()
        } else {
            "✗".dimmed()
        };
        let line = format!(
            "{:>4}  {:<28} [{}, {}] {}",
            test.id, test.name, test.min, test.max, test.units
        );
        if test.enabled {
            println!("  {} {}", check, line);
        } else {
            println!("  {} {}", check, line.dimmed());
        }
        if !test.steps.is_empty() {
            println!("        {}", test.steps.join(", ").dimmed());
        }
    }
}
