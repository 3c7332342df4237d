//! Sequence runner
//!
//! Drives one sequence through a device session. Tests run strictly in
//! declared order, and steps within a test in declared order, because each
//! step may depend on instrument state left by the previous one.
//!
//! Per test the lifecycle is `Pending -> Running -> {Pass, Fail, Skipped,
//! Cancelled}`. Step failures are contained: they are logged and recorded on
//! the test's result, and the next step still runs. Only session failures
//! (open, command registration, close) abort a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::error::StepExecutionError;
use crate::common::{Error, Result};
use crate::registry::CommandRegistry;
use crate::report::{Outcome, ResultLog, StepFailure, TestResult};
use crate::sequence::{Sequence, TestCase};
use crate::session::DeviceSession;
use crate::step::parse_step;

/// Cooperative cancellation flag, checked between tests and between steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives progress as the run advances
///
/// All methods default to no-ops so callers only implement what they show.
pub trait RunObserver {
    /// A test entered the running state
    fn test_started(&mut self, _test: &TestCase) {}

    /// A step was skipped after failing
    fn step_failed(&mut self, _test: &TestCase, _failure: &StepFailure) {}

    /// A test reached its terminal state
    fn test_finished(&mut self, _result: &TestResult) {}
}

/// Observer that ignores everything
pub struct Silent;

impl RunObserver for Silent {}

/// Adapts a closure into an observer of finished tests
pub struct OnResult<F>(pub F);

impl<F: FnMut(&TestResult)> RunObserver for OnResult<F> {
    fn test_finished(&mut self, result: &TestResult) {
        (self.0)(result)
    }
}

/// Executes a sequence against a device session
pub struct SequenceRunner<'a> {
    sequence: &'a Sequence,
    cancel: CancelToken,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(sequence: &'a Sequence) -> Self {
        Self {
            sequence,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every test and return the results in declared order
    ///
    /// The session is opened exactly once before the first test and closed
    /// exactly once after the last result. A failure to open aborts before
    /// any test runs. A failure to close is reported as
    /// [`Error::CloseFailed`], which still carries the results.
    #[tracing::instrument(
        skip_all,
        fields(sequence = %self.sequence.name, version = %self.sequence.version, resource = %resource)
    )]
    pub fn run<S>(
        &self,
        session: &mut S,
        resource: &str,
        observer: &mut dyn RunObserver,
    ) -> Result<ResultLog>
    where
        S: DeviceSession + ?Sized,
    {
        tracing::info!(tests = self.sequence.tests.len(), "Running test sequence");

        session.open(resource).map_err(|e| {
            tracing::error!(error = %e, "Failed to open session");
            Error::from(e)
        })?;

        let mut registry = CommandRegistry::new();
        if let Err(e) = session.register_commands(&mut registry) {
            tracing::error!(error = %e, "Failed to register commands");
            if let Err(close_err) = session.close() {
                tracing::error!(error = %close_err, "Failed to close session");
            }
            return Err(e.into());
        }
        tracing::debug!(commands = registry.len(), "Command registry built");

        let mut log = ResultLog::new();
        for test in &self.sequence.tests {
            let result = if self.cancel.is_cancelled() {
                cancelled(test, Vec::new())
            } else if !test.enabled {
                tracing::info!(test = %test.name, "Skipping disabled test");
                skipped(test)
            } else {
                observer.test_started(test);
                self.run_test(test, session, &registry, observer)
            };

            tracing::info!(
                test = %result.test_name,
                status = %result.status,
                measured = ?result.measured_value,
                "Test finished"
            );
            observer.test_finished(&result);
            log.push(result);
        }

        if let Err(e) = session.close() {
            tracing::error!(error = %e, "Failed to close session");
            return Err(Error::CloseFailed {
                source: e,
                results: log,
            });
        }

        tracing::debug!("{}", log.summary());
        Ok(log)
    }

    fn run_test<S>(
        &self,
        test: &TestCase,
        session: &mut S,
        registry: &CommandRegistry,
        observer: &mut dyn RunObserver,
    ) -> TestResult
    where
        S: DeviceSession + ?Sized,
    {
        tracing::info!(test = %test.name, id = test.id, "Running test");
        let mut failures = Vec::new();

        for (index, text) in test.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(test = %test.name, "Cancelled between steps");
                return cancelled(test, failures);
            }

            tracing::debug!(step = %text, "Executing step");
            if let Err(e) = execute_step(registry, text) {
                tracing::warn!(test = %test.name, step = %text, error = %e, "Step skipped");
                let failure = StepFailure {
                    index,
                    step: text.clone(),
                    message: e.to_string(),
                };
                observer.step_failed(test, &failure);
                failures.push(failure);
            }
        }

        if self.cancel.is_cancelled() {
            return cancelled(test, failures);
        }

        match session.acquire(test) {
            Ok(value) => {
                tracing::debug!(test = %test.name, value, units = %test.units, "Measured value");
                TestResult {
                    id: test.id,
                    test_name: test.name.clone(),
                    measured_value: Some(value),
                    status: classify(test, value),
                    units: test.units.clone(),
                    step_errors: failures,
                    acquisition_error: None,
                }
            }
            Err(e) => {
                tracing::warn!(test = %test.name, error = %e, "No measurement obtained");
                TestResult {
                    id: test.id,
                    test_name: test.name.clone(),
                    measured_value: None,
                    status: Outcome::Fail,
                    units: test.units.clone(),
                    step_errors: failures,
                    acquisition_error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Parse, resolve and invoke one step
fn execute_step(registry: &CommandRegistry, text: &str) -> std::result::Result<(), StepExecutionError> {
    let step = parse_step(text)?;
    let operation = registry.resolve(&step.command)?;
    operation.invoke(&step.params)?;
    Ok(())
}

/// Inclusive on both limits
pub fn classify(test: &TestCase, value: f64) -> Outcome {
    if test.within_limits(value) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

fn skipped(test: &TestCase) -> TestResult {
    TestResult {
        id: test.id,
        test_name: test.name.clone(),
        measured_value: None,
        status: Outcome::Skipped,
        units: test.units.clone(),
        step_errors: Vec::new(),
        acquisition_error: None,
    }
}

fn cancelled(test: &TestCase, step_errors: Vec<StepFailure>) -> TestResult {
    TestResult {
        id: test.id,
        test_name: test.name.clone(),
        measured_value: None,
        status: Outcome::Cancelled,
        units: test.units.clone(),
        step_errors,
        acquisition_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{ConnectionError, OperationError, RegistryError};
    use crate::registry::{Arity, Operation};
    use std::sync::Mutex;

    /// Session stub that records invocations and returns a fixed value
    struct Stub {
        calls: Arc<Mutex<Vec<String>>>,
        value: f64,
    }

    impl Stub {
        fn new(value: f64) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                value,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeviceSession for Stub {
        fn open(&mut self, _resource: &str) -> std::result::Result<(), ConnectionError> {
            Ok(())
        }

        fn register_commands(
            &self,
            registry: &mut CommandRegistry,
        ) -> std::result::Result<(), RegistryError> {
            let calls = self.calls.clone();
            registry.register(
                "stub",
                Operation::new("power_on", Arity::Exact(1), move |p| {
                    calls.lock().unwrap().push(format!("power_on({})", p[0]));
                    Ok(())
                }),
            )?;
            registry.register(
                "stub",
                Operation::new("explode", Arity::Any, |_| {
                    Err(OperationError::driver("stub", "boom"))
                }),
            )
        }

        fn acquire(&mut self, _test: &TestCase) -> std::result::Result<f64, OperationError> {
            Ok(self.value)
        }

        fn close(&mut self) -> std::result::Result<(), ConnectionError> {
            Ok(())
        }
    }

    fn run(sequence: &Sequence, stub: &mut Stub) -> ResultLog {
        SequenceRunner::new(sequence)
            .run(stub, "SIM::1", &mut Silent)
            .unwrap()
    }

    #[test]
    fn test_classify_bounds_inclusive() {
        let test = TestCase::new(1, "t", 1.0, 2.0);
        assert_eq!(classify(&test, 1.0), Outcome::Pass);
        assert_eq!(classify(&test, 2.0), Outcome::Pass);
        assert_eq!(classify(&test, 1.0 - 1e-9), Outcome::Fail);
        assert_eq!(classify(&test, 2.0 + 1e-9), Outcome::Fail);
    }

    #[test]
    fn test_disabled_test_runs_no_steps() {
        let seq = Sequence::new("s", "1")
            .with_test(TestCase::new(1, "off", 0.0, 1.0).with_steps(["power_on(1)"]).disabled());
        let mut stub = Stub::new(0.5);

        let log = run(&seq, &mut stub);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].status, Outcome::Skipped);
        assert_eq!(log.entries()[0].measured_value, None);
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn test_bad_steps_do_not_stop_the_test() {
        let seq = Sequence::new("s", "1").with_test(
            TestCase::new(1, "t", 0.0, 1.0).with_steps([
                "bad step",
                "foo(1)",
                "power_on(x)",
                "power_on()",
                "explode()",
                "power_on(1)",
            ]),
        );
        let mut stub = Stub::new(0.5);

        let log = run(&seq, &mut stub);
        let result = &log.entries()[0];
        assert_eq!(stub.calls(), vec!["power_on(1)"]);
        assert_eq!(result.status, Outcome::Pass);
        let indices: Vec<usize> = result.step_errors.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel_marks_remaining_tests() {
        let seq = Sequence::new("s", "1")
            .with_test(TestCase::new(1, "a", 0.0, 1.0))
            .with_test(TestCase::new(2, "b", 0.0, 1.0));
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut stub = Stub::new(0.5);

        let mut observer = OnResult(move |_: &TestResult| trigger.cancel());
        let log = SequenceRunner::new(&seq)
            .with_cancel(cancel)
            .run(&mut stub, "SIM::1", &mut observer)
            .unwrap();

        let statuses: Vec<Outcome> = log.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Outcome::Pass, Outcome::Cancelled]);
    }
}
