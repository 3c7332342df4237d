//! Bench Sequencer - a test-sequence execution engine for instrument benches
//!
//! A sequence is a list of declarative tests. Each enabled test runs its
//! steps (`setup_voltage(5, 1)`, `power_on()`, ...) through a command
//! registry filled by the session's drivers, takes one measurement and is
//! classified against its limits.

pub mod cli;
pub mod commands;
pub mod common;
pub mod drivers;
pub mod registry;
pub mod report;
pub mod runner;
pub mod sequence;
pub mod session;
pub mod step;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use registry::{Arity, CommandRegistry, Operation};
pub use report::{Outcome, ResultLog, TestResult};
pub use runner::{CancelToken, RunObserver, SequenceRunner};
pub use sequence::{Sequence, TestCase};
pub use session::{Bench, DeviceSession};
