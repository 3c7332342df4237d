//! Simulated programmable power supply
//!
//! Commands (channels are 1-based):
//! - `setup_voltage(volts, channel)`
//! - `setup_current(milliamps, channel)` sets the current limit
//! - `power_on()` / `power_off()` switch all outputs
//!
//! State lives behind a shared lock so registered operations and the
//! multimeter probe observe the same outputs.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::common::config::PowerSupplyConfig;
use crate::common::error::{ConnectionError, OperationError, RegistryError};
use crate::registry::{Arity, CommandRegistry, Operation};

use super::{check_resource, Driver};

const DRIVER_NAME: &str = "power_supply";

/// Programmed values of one output channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub voltage: f64,
    pub current_limit_ma: i64,
}

#[derive(Debug)]
struct PsuState {
    resource: Option<String>,
    output_on: bool,
    channels: Vec<ChannelState>,
}

impl PsuState {
    fn channel_index(&self, command: &str, channel: i64) -> Result<usize, OperationError> {
        if channel < 1 || channel as usize > self.channels.len() {
            return Err(OperationError::invalid_argument(
                command,
                format!("channel {} out of range 1..={}", channel, self.channels.len()),
            ));
        }
        Ok(channel as usize - 1)
    }
}

type Shared = Arc<Mutex<PsuState>>;

fn lock(state: &Shared) -> Result<MutexGuard<'_, PsuState>, OperationError> {
    state
        .lock()
        .map_err(|_| OperationError::driver(DRIVER_NAME, "state lock poisoned"))
}

fn lock_connected(state: &Shared) -> Result<MutexGuard<'_, PsuState>, OperationError> {
    let guard = lock(state)?;
    if guard.resource.is_none() {
        return Err(OperationError::NotConnected(DRIVER_NAME.to_string()));
    }
    Ok(guard)
}

/// Simulated bench power supply
pub struct SimPowerSupply {
    config: PowerSupplyConfig,
    state: Shared,
}

impl SimPowerSupply {
    pub fn new(config: PowerSupplyConfig) -> Self {
        let channels = vec![
            ChannelState {
                voltage: 0.0,
                current_limit_ma: config.default_current_ma,
            };
            config.channels
        ];
        Self {
            config,
            state: Arc::new(Mutex::new(PsuState {
                resource: None,
                output_on: false,
                channels,
            })),
        }
    }

    /// Read-only handle onto the supply outputs, for wiring a meter to it
    pub fn probe(&self) -> PowerSupplyProbe {
        PowerSupplyProbe {
            state: self.state.clone(),
        }
    }
}

impl Driver for SimPowerSupply {
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

        // A fresh connection starts from the instrument's reset state
        state.resource = Some(resource.to_string());
        state.output_on = false;
        for ch in state.channels.iter_mut() {
            ch.voltage = 0.0;
            ch.current_limit_ma = self.config.default_current_ma;
        }

        tracing::info!(driver = DRIVER_NAME, resource, "Connected");
        Ok(())
    }

    fn register_commands(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        let state = self.state.clone();
        let max_voltage = self.config.max_voltage;
        registry.register(
            DRIVER_NAME,
            Operation::new("setup_voltage", Arity::Exact(2), move |p| {
                let (volts, channel) = (p[0], p[1]);
                if !(0..=max_voltage).contains(&volts) {
                    return Err(OperationError::invalid_argument(
                        "setup_voltage",
                        format!("{} V outside 0..={} V", volts, max_voltage),
                    ));
                }
                let mut s = lock_connected(&state)?;
                let idx = s.channel_index("setup_voltage", channel)?;
                s.channels[idx].voltage = volts as f64;
                tracing::debug!(channel, volts, "Voltage set");
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        let max_current = self.config.max_current_ma;
        registry.register(
            DRIVER_NAME,
            Operation::new("setup_current", Arity::Exact(2), move |p| {
                let (milliamps, channel) = (p[0], p[1]);
                if !(0..=max_current).contains(&milliamps) {
                    return Err(OperationError::invalid_argument(
                        "setup_current",
                        format!("{} mA outside 0..={} mA", milliamps, max_current),
                    ));
                }
                let mut s = lock_connected(&state)?;
                let idx = s.channel_index("setup_current", channel)?;
                s.channels[idx].current_limit_ma = milliamps;
                tracing::debug!(channel, milliamps, "Current limit set");
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        registry.register(
            DRIVER_NAME,
            Operation::new("power_on", Arity::Exact(0), move |_| {
                lock_connected(&state)?.output_on = true;
                tracing::debug!("Outputs on");
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        registry.register(
            DRIVER_NAME,
            Operation::new("power_off", Arity::Exact(0), move |_| {
                lock_connected(&state)?.output_on = false;
                tracing::debug!("Outputs off");
                Ok(())
            }),
        )
    }

    fn disconnect(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().map_err(|_| ConnectionError::CloseFailed {
            driver: DRIVER_NAME.to_string(),
            reason: "state lock poisoned".to_string(),
        })?;

        // Outputs are switched off before the link is dropped
        state.output_on = false;
        if let Some(resource) = state.resource.take() {
            tracing::info!(driver = DRIVER_NAME, resource = %resource, "Disconnected");
        }
        Ok(())
    }
}

/// Shared view of the supply outputs
#[derive(Clone)]
pub struct PowerSupplyProbe {
    state: Shared,
}

impl PowerSupplyProbe {
    /// Voltage present at a channel's terminals
    ///
    /// Zero while outputs are off or the channel has no current budget.
    pub fn output_voltage(&self, channel: i64) -> Result<f64, OperationError> {
        let s = lock_connected(&self.state)?;
        let idx = s.channel_index("read", channel)?;
        let ch = s.channels[idx];
        if !s.output_on || ch.current_limit_ma == 0 {
            return Ok(0.0);
        }
        Ok(ch.voltage)
    }

    pub fn channel(&self, channel: i64) -> Option<ChannelState> {
        let s = self.state.lock().ok()?;
        let idx = s.channel_index("read", channel).ok()?;
        Some(s.channels[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> (SimPowerSupply, CommandRegistry) {
        let mut psu = SimPowerSupply::new(PowerSupplyConfig::default());
        psu.connect("SIM::PSU").unwrap();
        let mut registry = CommandRegistry::new();
        psu.register_commands(&mut registry).unwrap();
        (psu, registry)
    }

    fn run(registry: &CommandRegistry, name: &str, params: &[i64]) -> Result<(), OperationError> {
        registry.resolve(name).unwrap().invoke(params)
    }

    #[test]
    fn test_registers_all_commands() {
        let (_psu, registry) = connected();
        for name in ["setup_voltage", "setup_current", "power_on", "power_off"] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_output_follows_power_state() {
        let (psu, registry) = connected();
        let probe = psu.probe();

        run(&registry, "setup_voltage", &[5, 1]).unwrap();
        assert_eq!(probe.output_voltage(1).unwrap(), 0.0);

        run(&registry, "power_on", &[]).unwrap();
        assert_eq!(probe.output_voltage(1).unwrap(), 5.0);
        assert_eq!(probe.output_voltage(2).unwrap(), 0.0);

        run(&registry, "setup_current", &[0, 1]).unwrap();
        assert_eq!(probe.output_voltage(1).unwrap(), 0.0);

        run(&registry, "setup_current", &[500, 1]).unwrap();
        run(&registry, "power_off", &[]).unwrap();
        assert_eq!(probe.output_voltage(1).unwrap(), 0.0);
        assert_eq!(probe.channel(1).unwrap().current_limit_ma, 500);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let (_psu, registry) = connected();
        assert!(matches!(
            run(&registry, "setup_voltage", &[5, 9]),
            Err(OperationError::InvalidArgument { .. })
        ));
        assert!(matches!(
            run(&registry, "setup_voltage", &[500, 1]),
            Err(OperationError::InvalidArgument { .. })
        ));
        assert!(matches!(
            run(&registry, "setup_voltage", &[5]),
            Err(OperationError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_commands_fail_when_disconnected() {
        let (mut psu, registry) = connected();
        psu.disconnect().unwrap();
        assert_eq!(
            run(&registry, "power_on", &[]),
            Err(OperationError::NotConnected(DRIVER_NAME.to_string()))
        );
    }

    #[test]
    fn test_connect_twice_fails() {
        let (mut psu, _registry) = connected();
        assert!(matches!(
            psu.connect("SIM::PSU"),
            Err(ConnectionError::AlreadyOpen { .. })
        ));
    }
}
