//! Configuration file handling

use serde::Deserialize;

use super::paths::config_path;
use super::Result;

/// Commented template written by `bench-seq config --init`
pub const DEFAULT_CONFIG: &str = r#"# bench-sequencer configuration

[bench]
# Resource every driver connects to unless it sets its own
resource = "SIM::BENCH"

[power_supply]
# resource = "GPIB::5"
channels = 2
max_voltage = 30
max_current_ma = 3000
default_current_ma = 1000

[multimeter]
# resource = "GPIB::22"
offset = 0.0
range = 20

[output]
color = true
"#;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Session-wide settings
    #[serde(default)]
    pub bench: BenchConfig,

    /// Simulated power supply
    #[serde(default)]
    pub power_supply: PowerSupplyConfig,

    /// Simulated multimeter
    #[serde(default)]
    pub multimeter: MultimeterConfig,

    /// Console output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Session-wide settings
#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    /// Resource every driver connects to unless it has its own
    #[serde(default = "default_resource")]
    pub resource: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
        }
    }
}

fn default_resource() -> String {
    "SIM::BENCH".to_string()
}

/// Power supply limits and defaults
#[derive(Debug, Deserialize, Clone)]
pub struct PowerSupplyConfig {
    /// Resource override for this instrument
    #[serde(default)]
    pub resource: Option<String>,

    /// Number of output channels
    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Highest programmable voltage, in volts
    #[serde(default = "default_max_voltage")]
    pub max_voltage: i64,

    /// Highest programmable current limit, in milliamps
    #[serde(default = "default_max_current")]
    pub max_current_ma: i64,

    /// Current limit applied at connect, in milliamps
    #[serde(default = "default_current")]
    pub default_current_ma: i64,
}

impl Default for PowerSupplyConfig {
    fn default() -> Self {
        Self {
            resource: None,
            channels: default_channels(),
            max_voltage: default_max_voltage(),
            max_current_ma: default_max_current(),
            default_current_ma: default_current(),
        }
    }
}

fn default_channels() -> usize {
    2
}
fn default_max_voltage() -> i64 {
    30
}
fn default_max_current() -> i64 {
    3000
}
fn default_current() -> i64 {
    1000
}

/// Multimeter settings
#[derive(Debug, Deserialize, Clone)]
pub struct MultimeterConfig {
    /// Resource override for this instrument
    #[serde(default)]
    pub resource: Option<String>,

    /// Constant added to every reading, in volts
    #[serde(default)]
    pub offset: f64,

    /// Measurement range at connect, in volts
    #[serde(default = "default_range")]
    pub range: i64,
}

impl Default for MultimeterConfig {
    fn default() -> Self {
        Self {
            resource: None,
            offset: 0.0,
            range: default_range(),
        }
    }
}

fn default_range() -> i64 {
    20
}

/// Console output settings
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Colorize console output
    #[serde(default = "default_color")]
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
        }
    }
}

fn default_color() -> bool {
    true
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.power_supply.channels == 0 {
            return Err(super::Error::Config(
                "power_supply.channels must be at least 1".to_string(),
            ));
        }
        if self.power_supply.default_current_ma > self.power_supply.max_current_ma {
            return Err(super::Error::Config(
                "power_supply.default_current_ma exceeds max_current_ma".to_string(),
            ));
        }
        if self.multimeter.range <= 0 {
            return Err(super::Error::Config(
                "multimeter.range must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
