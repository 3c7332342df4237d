//! Device session interface
//!
//! A session owns the connection to the instruments for exactly one run:
//! it is opened once before the first test, fills the command registry,
//! supplies one measured value per test and is closed once at the end.

mod bench;

pub use bench::Bench;

use crate::common::error::{ConnectionError, OperationError, RegistryError};
use crate::registry::CommandRegistry;
use crate::sequence::TestCase;

/// Lifecycle-scoped connection to one or more instruments
pub trait DeviceSession {
    /// Connect to the instruments at `resource`
    fn open(&mut self, resource: &str) -> Result<(), ConnectionError>;

    /// Register every command the session's drivers support
    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError>;

    /// Obtain the measured value for a test whose steps have all run
    fn acquire(&mut self, test: &TestCase) -> Result<f64, OperationError>;

    /// Release the connections
    fn close(&mut self) -> Result<(), ConnectionError>;
}

impl<S: DeviceSession + ?Sized> DeviceSession for Box<S> {
    fn open(&mut self, resource: &str) -> Result<(), ConnectionError> {
        (**self).open(resource)
    }

    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        (**self).register_commands(registry)
    }

    fn acquire(&mut self, test: &TestCase) -> Result<f64, OperationError> {
        (**self).acquire(test)
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        (**self).close()
    }
}
