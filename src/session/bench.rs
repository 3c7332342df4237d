//! A session composed of several instrument drivers

use std::collections::HashMap;

use crate::common::config::Config;
use crate::common::error::{ConnectionError, OperationError, RegistryError};
use crate::drivers::{Driver, SimMultimeter, SimPowerSupply};
use crate::registry::CommandRegistry;
use crate::sequence::TestCase;

use super::DeviceSession;

/// Set of drivers opened and closed together
///
/// Each driver connects to the session resource unless it has its own
/// address override. The first driver that takes measurements supplies
/// acquisitions, unless one is named explicitly.
#[derive(Default)]
pub struct Bench {
    drivers: Vec<Box<dyn Driver>>,
    resources: HashMap<String, String>,
    meter: Option<String>,
    /// Names of drivers currently connected, in connect order
    connected: Vec<String>,
}

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated power supply with a multimeter wired to its outputs
    pub fn simulated(config: &Config) -> Self {
        let psu = SimPowerSupply::new(config.power_supply.clone());
        let dmm = SimMultimeter::new(config.multimeter.clone(), psu.probe());

        let mut bench = Self::new()
            .with_driver(psu)
            .with_driver(dmm)
            .measure_with("multimeter");
        if let Some(resource) = &config.power_supply.resource {
            bench = bench.with_resource("power_supply", resource.clone());
        }
        if let Some(resource) = &config.multimeter.resource {
            bench = bench.with_resource("multimeter", resource.clone());
        }
        bench
    }

    pub fn with_driver(mut self, driver: impl Driver + 'static) -> Self {
        self.drivers.push(Box::new(driver));
        self
    }

    /// Give one driver its own resource address
    pub fn with_resource(mut self, driver: &str, resource: impl Into<String>) -> Self {
        self.resources.insert(driver.to_string(), resource.into());
        self
    }

    /// Use a specific driver for acquisitions
    pub fn measure_with(mut self, driver: &str) -> Self {
        self.meter = Some(driver.to_string());
        self
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    fn meter_mut(&mut self) -> Option<&mut Box<dyn Driver>> {
        match &self.meter {
            Some(name) => self.drivers.iter_mut().find(|d| d.name() == name.as_str()),
            None => self.drivers.iter_mut().find(|d| d.measures()),
        }
    }

    /// Disconnect every connected driver in reverse order
    ///
    /// All drivers are attempted; the first failure is returned.
    fn disconnect_all(&mut self) -> Result<(), ConnectionError> {
        let mut first_err = None;
        while let Some(name) = self.connected.pop() {
            let Some(driver) = self.drivers.iter_mut().find(|d| d.name() == name) else {
                continue;
            };
            if let Err(e) = driver.disconnect() {
                tracing::error!(driver = %name, error = %e, "Disconnect failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl DeviceSession for Bench {
    fn open(&mut self, resource: &str) -> Result<(), ConnectionError> {
        for i in 0..self.drivers.len() {
            let name = self.drivers[i].name().to_string();
            let target = self
                .resources
                .get(&name)
                .cloned()
                .unwrap_or_else(|| resource.to_string());

            if let Err(e) = self.drivers[i].connect(&target) {
                tracing::error!(driver = %name, resource = %target, error = %e, "Connect failed");
                // Leave nothing half-open behind
                let _ = self.disconnect_all();
                return Err(e);
            }
            self.connected.push(name);
        }
        Ok(())
    }

    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        for driver in &self.drivers {
            driver.register_commands(registry)?;
        }
        Ok(())
    }

    fn acquire(&mut self, test: &TestCase) -> Result<f64, OperationError> {
        match self.meter_mut() {
            Some(meter) => meter.read(test),
            None => Err(OperationError::driver(
                "bench",
                "no measuring instrument in this bench",
            )),
        }
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.disconnect_all()
    }
}
