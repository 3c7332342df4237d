//! Simulated digital multimeter
//!
//! The meter's probes are wired to the simulated power supply, so readings
//! are deterministic functions of what the sequence programmed.
//!
//! Commands:
//! - `dmm_channel(channel)` moves the probes to a supply channel
//! - `dmm_range(volts)` selects the measurement range
//! - `measure()` takes a reading and holds it for the current test

use std::sync::{Arc, Mutex, MutexGuard};

use crate::common::config::MultimeterConfig;
use crate::common::error::{ConnectionError, OperationError, RegistryError};
use crate::registry::{Arity, CommandRegistry, Operation};
use crate::sequence::TestCase;

use super::power_supply::PowerSupplyProbe;
use super::{check_resource, Driver};

const DRIVER_NAME: &str = "multimeter";

#[derive(Debug)]
struct MeterState {
    resource: Option<String>,
    channel: i64,
    range: i64,
    /// Reading taken by `measure()` and not yet consumed
    held: Option<f64>,
}

type Shared = Arc<Mutex<MeterState>>;

fn lock_connected(state: &Shared) -> Result<MutexGuard<'_, MeterState>, OperationError> {
    let guard = state
        .lock()
        .map_err(|_| OperationError::driver(DRIVER_NAME, "state lock poisoned"))?;
    if guard.resource.is_none() {
        return Err(OperationError::NotConnected(DRIVER_NAME.to_string()));
    }
    Ok(guard)
}

fn sample(
    probe: &PowerSupplyProbe,
    state: &MeterState,
    offset: f64,
) -> Result<f64, OperationError> {
    let value = probe.output_voltage(state.channel)? + offset;
    if value.abs() > state.range as f64 {
        return Err(OperationError::driver(
            DRIVER_NAME,
            format!("overload: {} V exceeds {} V range", value, state.range),
        ));
    }
    Ok(value)
}

/// Simulated multimeter reading a power supply's outputs
pub struct SimMultimeter {
    config: MultimeterConfig,
    probe: PowerSupplyProbe,
    state: Shared,
}

impl SimMultimeter {
    pub fn new(config: MultimeterConfig, probe: PowerSupplyProbe) -> Self {
        let state = MeterState {
            resource: None,
            channel: 1,
            range: config.range,
            held: None,
        };
        Self {
            config,
            probe,
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl Driver for SimMultimeter {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn connect(&mut self, resource: &str) -> Result<(), ConnectionError> {
        check_resource(DRIVER_NAME, resource)?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| ConnectionError::open_failed(DRIVER_NAME, resource, "state lock poisoned"))?;
        if let Some(current) = &state.resource {
            return Err(ConnectionError::AlreadyOpen {
                driver: DRIVER_NAME.to_string(),
                resource: current.clone(),
            });
        }

        state.resource = Some(resource.to_string());
        state.channel = 1;
        state.range = self.config.range;
        state.held = None;

        tracing::info!(driver = DRIVER_NAME, resource, "Connected");
        Ok(())
    }

    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        let state = self.state.clone();
        registry.register(
            DRIVER_NAME,
            Operation::new("dmm_channel", Arity::Exact(1), move |p| {
                let channel = p[0];
                if channel < 1 {
                    return Err(OperationError::invalid_argument(
                        "dmm_channel",
                        format!("channel {} must be 1 or higher", channel),
                    ));
                }
                lock_connected(&state)?.channel = channel;
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        registry.register(
            DRIVER_NAME,
            Operation::new("dmm_range", Arity::Exact(1), move |p| {
                let range = p[0];
                if range <= 0 {
                    return Err(OperationError::invalid_argument(
                        "dmm_range",
                        format!("range {} V must be positive", range),
                    ));
                }
                lock_connected(&state)?.range = range;
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        let probe = self.probe.clone();
        let offset = self.config.offset;
        registry.register(
            DRIVER_NAME,
            Operation::new("measure", Arity::Exact(0), move |_| {
                let mut s = lock_connected(&state)?;
                let value = sample(&probe, &s, offset)?;
                tracing::debug!(channel = s.channel, value, "Reading held");
                s.held = Some(value);
                Ok(())
            }),
        )
    }

    fn disconnect(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().map_err(|_| ConnectionError::CloseFailed {
            driver: DRIVER_NAME.to_string(),
            reason: "state lock poisoned".to_string(),
        })?;
        state.held = None;
        if let Some(resource) = state.resource.take() {
            tracing::info!(driver = DRIVER_NAME, resource = %resource, "Disconnected");
        }
        Ok(())
    }

    fn measures(&self) -> bool {
        true
    }

    /// Return the held reading, or take a fresh one if the test never
    /// called `measure()`. The held reading is consumed either way.
    fn read(&mut self, test: &TestCase) -> Result<f64, OperationError> {
        let mut s = lock_connected(&self.state)?;
        let value = match s.held.take() {
            Some(v) => v,
            None => sample(&self.probe, &s, self.config.offset)?,
        };
        tracing::debug!(test = %test.name, value, "Acquired");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PowerSupplyConfig;
    use crate::drivers::SimPowerSupply;

    fn bench() -> (SimPowerSupply, SimMultimeter, CommandRegistry) {
        let mut psu = SimPowerSupply::new(PowerSupplyConfig::default());
        let mut dmm = SimMultimeter::new(MultimeterConfig::default(), psu.probe());
        psu.connect("SIM::PSU").unwrap();
        dmm.connect("SIM::DMM").unwrap();

        let mut registry = CommandRegistry::new();
        psu.register_commands(&mut registry).unwrap();
        dmm.register_commands(&mut registry).unwrap();
        (psu, dmm, registry)
    }

    fn run(registry: &CommandRegistry, name: &str, params: &[i64]) -> Result<(), OperationError> {
        registry.resolve(name).unwrap().invoke(params)
    }

    #[test]
    fn test_reads_selected_channel() {
        let (_psu, mut dmm, registry) = bench();
        let test = TestCase::new(1, "rail", 0.0, 20.0);

        run(&registry, "setup_voltage", &[5, 1]).unwrap();
        run(&registry, "setup_voltage", &[12, 2]).unwrap();
        run(&registry, "power_on", &[]).unwrap();

        assert_eq!(dmm.read(&test).unwrap(), 5.0);
        run(&registry, "dmm_channel", &[2]).unwrap();
        assert_eq!(dmm.read(&test).unwrap(), 12.0);
    }

    #[test]
    fn test_held_reading_consumed_once() {
        let (_psu, mut dmm, registry) = bench();
        let test = TestCase::new(1, "rail", 0.0, 20.0);

        run(&registry, "setup_voltage", &[5, 1]).unwrap();
        run(&registry, "power_on", &[]).unwrap();
        run(&registry, "measure", &[]).unwrap();
        run(&registry, "power_off", &[]).unwrap();

        assert_eq!(dmm.read(&test).unwrap(), 5.0);
        assert_eq!(dmm.read(&test).unwrap(), 0.0);
    }

    #[test]
    fn test_overload_outside_range() {
        let (_psu, mut dmm, registry) = bench();
        let test = TestCase::new(1, "rail", 0.0, 20.0);

        run(&registry, "setup_voltage", &[12, 1]).unwrap();
        run(&registry, "power_on", &[]).unwrap();
        run(&registry, "dmm_range", &[10]).unwrap();

        assert!(matches!(dmm.read(&test), Err(OperationError::Driver { .. })));
        assert!(run(&registry, "dmm_range", &[0]).is_err());
    }
}
