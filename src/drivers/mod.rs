//! Instrument driver plugins
//!
//! A driver owns the connection to one instrument and contributes its
//! commands to the session's registry. Drivers within one bench must use
//! disjoint command names.

pub mod multimeter;
pub mod power_supply;

use crate::common::error::{ConnectionError, OperationError, RegistryError};
use crate::registry::CommandRegistry;
use crate::sequence::TestCase;

pub use multimeter::SimMultimeter;
pub use power_supply::{PowerSupplyProbe, SimPowerSupply};

/// One instrument driver
pub trait Driver: Send {
    /// Stable identifier, also used as the command owner in the registry
    fn name(&self) -> &str;

    /// Open the connection to the instrument at `resource`
    fn connect(&mut self, resource: &str) -> Result<(), ConnectionError>;

    /// Add this driver's commands to the registry
    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError>;

    /// Release the connection
    fn disconnect(&mut self) -> Result<(), ConnectionError>;

    /// Whether this driver can supply a test's measured value
    fn measures(&self) -> bool {
        false
    }

    /// Acquire the measured value for a test
    fn read(&mut self, _test: &TestCase) -> Result<f64, OperationError> {
        Err(OperationError::driver(self.name(), "driver does not take measurements"))
    }
}

/// Check a resource identifier of the form `INTERFACE::ADDRESS[::...]`
pub(crate) fn check_resource(driver: &str, resource: &str) -> Result<(), ConnectionError> {
    let parts: Vec<&str> = resource.split("::").collect();
    if parts.len() < 2 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ConnectionError::open_failed(
            driver,
            resource,
            "expected a resource like 'GPIB::5' or 'SIM::PSU'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_resource() {
        assert!(check_resource("psu", "GPIB::1").is_ok());
        assert!(check_resource("psu", "TCPIP::10.0.0.2::INSTR").is_ok());
        assert!(check_resource("psu", "").is_err());
        assert!(check_resource("psu", "GPIB").is_err());
        assert!(check_resource("psu", "GPIB::").is_err());
    }
}
