//! CLI command handling
//!
//! Dispatches CLI commands to the engine and formats output.

mod output;

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::commands::{Commands, SequenceCommands};
use crate::common::config::{Config, DEFAULT_CONFIG};
use crate::common::{paths, Error, Result};
use crate::registry::CommandRegistry;
use crate::report::{Outcome, ResultLog};
use crate::runner::{CancelToken, SequenceRunner};
use crate::sequence::{self, Sequence, TestCase};
use crate::session::{Bench, DeviceSession};
use crate::step::{parse_step, parse_step_list};

use output::ConsoleObserver;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    let config = Config::load()?;
    if !config.output.color {
        colored::control::set_override(false);
    }

    match command {
        Commands::Run {
            path,
            resource,
            json,
            verbose,
            log_file: _,
        } => run(&config, path, resource, json, verbose).await,

        Commands::Check { path, commands } => check(&config, &path, commands),

        Commands::Commands { json } => list_commands(&config, json),

        Commands::Sequence(cmd) => edit_sequence(cmd),

        Commands::Config { init } => show_config(init),
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    sequence: &'a str,
    version: &'a str,
    results: &'a ResultLog,
}

async fn run(
    config: &Config,
    path: PathBuf,
    resource: Option<String>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let sequence = sequence::load(&path)?;
    let resource = resource.unwrap_or_else(|| config.bench.resource.clone());
    let mut bench = Bench::simulated(config);

    if !json {
        println!(
            "\n{} {} {}",
            "Running Sequence:".blue().bold(),
            sequence.name.white().bold(),
            format!("(version {})", sequence.version).dimmed()
        );
        println!("  {} {}", "Resource:".cyan(), resource.dimmed());
        println!(
            "  {} {}\n",
            "Drivers:".cyan(),
            bench.driver_names().join(", ").dimmed()
        );
    }

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current step...".yellow());
            trigger.cancel();
        }
    });

    // The engine blocks on instrument I/O, so it runs off the async workers
    let task = tokio::task::spawn_blocking(move || {
        let mut observer = ConsoleObserver::new(verbose, json);
        let log = SequenceRunner::new(&sequence)
            .with_cancel(cancel)
            .run(&mut bench, &resource, &mut observer);
        (sequence, log)
    });
    let (sequence, log) = task
        .await
        .map_err(|e| Error::Internal(format!("runner task failed: {}", e)))?;
    ctrl_c.abort();

    // Results of a completed run are reported even if the session failed to close
    let (log, close_error) = match log {
        Ok(log) => (log, None),
        Err(Error::CloseFailed { source, results }) => (results, Some(source)),
        Err(e) => return Err(e),
    };

    if json {
        let report = RunReport {
            sequence: &sequence.name,
            version: &sequence.version,
            results: &log,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_totals(&log);
    }

    if let Some(e) = close_error {
        return Err(e.into());
    }

    let failed = log
        .iter()
        .filter(|r| matches!(r.status, Outcome::Fail | Outcome::Cancelled))
        .count();
    if failed > 0 {
        return Err(Error::TestsFailed {
            failed,
            total: log.len(),
        });
    }
    Ok(())
}

fn check(config: &Config, path: &Path, resolve: bool) -> Result<()> {
    let sequence = sequence::read(path)?;
    let mut issues = sequence::validate(&sequence);

    if resolve {
        let mut registry = CommandRegistry::new();
        Bench::simulated(config).register_commands(&mut registry)?;
        issues.extend(resolve_steps(&sequence, &registry));
    }

    println!(
        "{} {} ({} tests, {} enabled)",
        "Sequence:".blue().bold(),
        sequence.name.white().bold(),
        sequence.tests.len(),
        sequence.enabled_count()
    );

    if issues.is_empty() {
        println!("  {} No problems found", "✓".green());
        return Ok(());
    }

    for issue in &issues {
        if issue.fatal {
            println!("  {} {}", "✗".red(), issue);
        } else {
            println!("  {} {}", "!".yellow(), issue);
        }
    }

    let fatal: Vec<String> = issues
        .iter()
        .filter(|i| i.fatal)
        .map(|i| i.to_string())
        .collect();
    if fatal.is_empty() {
        Ok(())
    } else {
        Err(crate::common::error::SequenceLoadError::Invalid(fatal).into())
    }
}

/// Steps that parse but name no command, or pass the wrong parameter count
fn resolve_steps(sequence: &Sequence, registry: &CommandRegistry) -> Vec<sequence::Issue> {
    let mut issues = Vec::new();
    for test in &sequence.tests {
        for text in &test.steps {
            let Ok(step) = parse_step(text) else {
                continue;
            };
            let message = match registry.resolve(&step.command) {
                Err(e) => e.to_string(),
                Ok(op) if !op.arity().accepts(step.params.len()) => format!(
                    "'{}' takes {} parameter(s), step passes {}",
                    step.command,
                    op.arity(),
                    step.params.len()
                ),
                Ok(_) => continue,
            };
            issues.push(sequence::Issue {
                test_id: Some(test.id),
                message,
                fatal: false,
            });
        }
    }
    issues
}

fn list_commands(config: &Config, json: bool) -> Result<()> {
    let bench = Bench::simulated(config);
    let mut registry = CommandRegistry::new();
    bench.register_commands(&mut registry)?;
    let commands = registry.commands();

    if json {
        println!("{}", serde_json::to_string_pretty(&commands)?);
        return Ok(());
    }

    println!("{}", "Commands:".blue().bold());
    for cmd in &commands {
        println!(
            "  {} {:<14} {}",
            format!("{:<16}", cmd.name).white().bold(),
            format!("{} param(s)", cmd.arity),
            cmd.driver.dimmed()
        );
    }
    Ok(())
}

fn edit_sequence(cmd: SequenceCommands) -> Result<()> {
    match cmd {
        SequenceCommands::New {
            path,
            name,
            version,
            force,
        } => {
            if path.exists() && !force {
                return Err(Error::Config(format!(
                    "'{}' already exists. Use --force to overwrite",
                    path.display()
                )));
            }
            sequence::save(&Sequence::new(name, version), &path)?;
            println!("Created {}", path.display());
            Ok(())
        }

        SequenceCommands::List { path } => {
            let seq = sequence::read(&path)?;
            output::print_sequence(&seq);
            Ok(())
        }

        SequenceCommands::Add {
            path,
            name,
            steps,
            min,
            max,
            units,
            id,
            disabled,
        } => {
            let mut seq = sequence::read(&path)?;
            let id = match id {
                Some(id) => id,
                None => seq.next_id()?,
            };
            if min > max {
                return Err(Error::InvalidLimits { id, min, max });
            }
            let mut test = TestCase::new(id, name, min, max)
                .with_steps(parse_step_list(&steps))
                .with_units(units);
            if disabled {
                test = test.disabled();
            }
            seq.add_test(test)?;
            sequence::save(&seq, &path)?;
            println!("Added test {}", id);
            Ok(())
        }

        SequenceCommands::Edit {
            path,
            id,
            name,
            steps,
            min,
            max,
            units,
            output,
        } => {
            let mut seq = sequence::read(&path)?;
            let edit = TestEdit {
                name,
                steps: steps.as_deref().map(parse_step_list),
                min,
                max,
                units,
            };
            apply_edit(&mut seq, id, edit)?;

            let target = output.unwrap_or(path);
            sequence::save(&seq, &target)?;
            println!("Updated test {} in {}", id, target.display());
            Ok(())
        }

        SequenceCommands::Remove { path, id } => {
            let mut seq = sequence::read(&path)?;
            let removed = seq.remove_test(id)?;
            sequence::save(&seq, &path)?;
            println!("Removed test {} ({})", id, removed.name);
            Ok(())
        }

        SequenceCommands::Enable { path, id } => set_enabled(&path, id, true),

        SequenceCommands::Disable { path, id } => set_enabled(&path, id, false),

        SequenceCommands::Toggle { path, id } => {
            let mut seq = sequence::read(&path)?;
            let enabled = seq.toggle(id)?;
            sequence::save(&seq, &path)?;
            println!(
                "Test {} {}",
                id,
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}

/// Fields of a test to change; `None` keeps the current value
#[derive(Debug, Default)]
struct TestEdit {
    name: Option<String>,
    steps: Option<Vec<String>>,
    min: Option<f64>,
    max: Option<f64>,
    units: Option<String>,
}

fn apply_edit(seq: &mut Sequence, id: i64, edit: TestEdit) -> Result<()> {
    let current = seq.find(id).ok_or(Error::TestNotFound { id })?;
    let min = edit.min.unwrap_or(current.min);
    let max = edit.max.unwrap_or(current.max);

    // Limits first, so a rejected edit leaves the test untouched
    seq.set_limits(id, min, max)?;
    if let Some(name) = edit.name {
        seq.rename_test(id, name)?;
    }
    if let Some(steps) = edit.steps {
        seq.set_steps(id, steps)?;
    }
    if let Some(units) = edit.units {
        seq.set_units(id, units)?;
    }
    Ok(())
}

fn set_enabled(path: &Path, id: i64, enabled: bool) -> Result<()> {
    let mut seq = sequence::read(path)?;
    seq.set_enabled(id, enabled)?;
    sequence::save(&seq, path)?;
    println!(
        "Test {} {}",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn show_config(init: bool) -> Result<()> {
    let Some(path) = paths::config_path() else {
        return Err(Error::Config(
            "Could not determine a configuration directory".to_string(),
        ));
    };

    if init {
        if path.exists() {
            println!("Config already exists: {}", path.display());
            return Ok(());
        }
        paths::ensure_config_dir()?;
        std::fs::write(&path, DEFAULT_CONFIG)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    println!("Config file: {}", path.display());
    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        println!("\n{}", content);
    } else {
        println!("(not present; defaults in use. Create one with 'bench-seq config --init')");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_steps_reports_unknown_and_arity() {
        let seq = Sequence::new("s", "1").with_test(TestCase::new(1, "t", 0.0, 1.0).with_steps([
            "setup_voltage(5, 1)",
            "setup_voltage(5)",
            "foo()",
            "bad step",
        ]));

        let mut registry = CommandRegistry::new();
        Bench::simulated(&Config::default())
            .register_commands(&mut registry)
            .unwrap();

        let issues = resolve_steps(&seq, &registry);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("takes 2"));
        assert!(issues[1].message.contains("Unknown command 'foo'"));
    }

    fn editable() -> Sequence {
        Sequence::new("s", "1").with_test(
            TestCase::new(1, "Rail 5V", 4.9, 5.1)
                .with_steps(["power_on()"])
                .with_units("V"),
        )
    }

    #[test]
    fn test_apply_edit_updates_given_fields() {
        let mut seq = editable();
        let edit = TestEdit {
            name: Some("Rail 3V3".to_string()),
            steps: Some(parse_step_list("setup_voltage(3, 1), power_on()")),
            min: Some(3.2),
            max: Some(3.4),
            units: None,
        };
        apply_edit(&mut seq, 1, edit).unwrap();

        let test = seq.find(1).unwrap();
        assert_eq!(test.name, "Rail 3V3");
        assert_eq!(test.steps, vec!["setup_voltage(3, 1)", "power_on()"]);
        assert_eq!((test.min, test.max), (3.2, 3.4));
        assert_eq!(test.units, "V");
    }

    #[test]
    fn test_apply_edit_rejects_inverted_limits() {
        let mut seq = editable();
        let edit = TestEdit {
            name: Some("renamed".to_string()),
            min: Some(6.0),
            ..Default::default()
        };

        assert!(matches!(
            apply_edit(&mut seq, 1, edit),
            Err(Error::InvalidLimits { id: 1, .. })
        ));
        assert_eq!(seq, editable());
    }

    #[test]
    fn test_apply_edit_unknown_test() {
        let mut seq = editable();
        assert!(matches!(
            apply_edit(&mut seq, 9, TestEdit::default()),
            Err(Error::TestNotFound { id: 9 })
        ));
    }
}
