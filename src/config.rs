use crate::prelude::*;
use crate::register::Registry;
use crate::transport::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverters: Vec<Inverter>,

    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    /// Serial device, e.g. /dev/ttyUSB0
    pub port: String,
    #[serde(default = "Config::default_address")]
    pub address: u8,

    pub baud_rate: Option<u32>,
    pub read_timeout: Option<u64>,
    pub register_file: Option<String>,
}
impl Inverter {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_READ_TIMEOUT)
    }

    pub fn register_file(&self) -> Option<&str> {
        self.register_file.as_deref()
    }

    /// The register table for this inverter's firmware.
    pub fn registry(&self) -> Result<Registry> {
        let registry = match self.register_file() {
            Some(file) => Registry::from_file(file)?,
            None => crate::growatt::registry()?,
        };
        Ok(registry)
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn config(&self) -> MutexGuard<'_, Config> {
        // Config is never mutated after load
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn inverters(&self) -> Vec<Inverter> {
        self.config().inverters.clone()
    }

    pub fn enabled_inverters(&self) -> Vec<Inverter> {
        self.inverters().into_iter().filter(|i| i.enabled()).collect()
    }

    /// Enabled inverters grouped by the serial port they share.
    pub fn inverters_by_port(&self) -> BTreeMap<String, Vec<Inverter>> {
        let mut ports: BTreeMap<String, Vec<Inverter>> = BTreeMap::new();
        for inverter in self.enabled_inverters() {
            ports
                .entry(inverter.port().to_string())
                .or_default()
                .push(inverter);
        }
        ports
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config().poll_interval)
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|err| anyhow!("error parsing {}: {}", file, err))?;

        config.validate()?;
        Ok(config)
    }

    /// Log the loaded settings. Called once logging is set up.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!(
            "  Inverters: {} configured, {} enabled",
            self.inverters.len(),
            self.inverters.iter().filter(|i| i.enabled).count()
        );
        for (i, inv) in self.inverters.iter().enumerate() {
            info!("    Inverter[{}]:", i);
            info!("      Enabled: {}", inv.enabled);
            info!("      Port: {}", inv.port);
            info!("      Address: {}", inv.address);
            info!("      Baud Rate: {}", inv.baud_rate());
            info!("      Read Timeout: {:?}", inv.read_timeout());
            info!(
                "      Register File: {}",
                inv.register_file().unwrap_or("built-in")
            );
        }
        info!("  Poll Interval: {}s", self.poll_interval);
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            bail!("poll_interval must be at least 1 second");
        }

        for (i, inv) in self.inverters.iter().enumerate() {
            if !inv.enabled {
                continue;
            }
            if inv.port.is_empty() {
                bail!("inverter[{}].port cannot be empty", i);
            }
            if !(1..=247).contains(&inv.address) {
                bail!("inverter[{}].address must be between 1 and 247", i);
            }
            if inv.baud_rate == Some(0) {
                bail!("inverter[{}].baud_rate cannot be 0", i);
            }
            if inv.read_timeout == Some(0) {
                bail!("inverter[{}].read_timeout cannot be 0", i);
            }
        }

        Ok(())
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_address() -> u8 {
        1
    }

    fn default_poll_interval() -> u64 {
        30
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
