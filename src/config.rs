//! Connection and reconnect options.

use fugit::MicrosDurationU64;
use serde::Deserialize;
use thiserror::Error;

/// Things that can be wrong with a [`Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("slave_id must be between 1 and 247, got {0}")]
    SlaveId(u8),
    #[error("baud must be positive")]
    Baud,
    #[error("port must be between 1 and 65535, got {0}")]
    Port(u32),
    #[error("reconnect_delay must be positive")]
    ReconnectDelay,
    #[error("reconnect_delay_max ({max} s) is below reconnect_delay ({delay} s)")]
    ReconnectDelayInverted { delay: u64, max: u64 },
    #[error("sec_timeout and usec_timeout cannot both be zero")]
    ZeroTimeout,
    #[error("usec_timeout must be below 1000000, got {0}")]
    MicrosTimeout(u32),
    #[error("host cannot be empty when use_tcp is set")]
    EmptyHost,
    #[error("device cannot be empty for Modbus RTU")]
    EmptyDevice,
}

/// Flat options record for one device connection.
///
/// Delays are in whole seconds, the timeout is `sec_timeout` seconds plus `usec_timeout`
/// microseconds.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Modbus TCP when set, Modbus RTU otherwise.
    #[serde(default)]
    pub use_tcp: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u32,

    /// Serial device path, e.g. `/dev/ttyUSB0`.
    #[serde(default)]
    pub device: String,
    #[serde(default = "Config::default_baud")]
    pub baud: u32,

    #[serde(default = "Config::default_slave_id")]
    pub slave_id: u8,

    #[serde(default = "Config::default_sec_timeout")]
    pub sec_timeout: u32,
    #[serde(default)]
    pub usec_timeout: u32,

    #[serde(default = "Config::default_reconnect_delay")]
    pub reconnect_delay: u64,
    #[serde(default = "Config::default_reconnect_delay_max")]
    pub reconnect_delay_max: u64,
    #[serde(default = "Config::default_exponential")]
    pub exponential: bool,

    /// Trace raw Modbus frames.
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_tcp: false,
            host: String::new(),
            port: Self::default_port(),
            device: String::new(),
            baud: Self::default_baud(),
            slave_id: Self::default_slave_id(),
            sec_timeout: Self::default_sec_timeout(),
            usec_timeout: 0,
            reconnect_delay: Self::default_reconnect_delay(),
            reconnect_delay_max: Self::default_reconnect_delay_max(),
            exponential: Self::default_exponential(),
            debug: false,
        }
    }
}

impl Config {
    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a YAML config file.
    pub fn from_file(file: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=247).contains(&self.slave_id) {
            return Err(ConfigError::SlaveId(self.slave_id));
        }
        if self.use_tcp {
            if self.host.is_empty() {
                return Err(ConfigError::EmptyHost);
            }
            if !(1..=65535).contains(&self.port) {
                return Err(ConfigError::Port(self.port));
            }
        } else {
            if self.device.is_empty() {
                return Err(ConfigError::EmptyDevice);
            }
            if self.baud == 0 {
                return Err(ConfigError::Baud);
            }
        }
        if self.reconnect_delay == 0 {
            return Err(ConfigError::ReconnectDelay);
        }
        if self.reconnect_delay_max < self.reconnect_delay {
            return Err(ConfigError::ReconnectDelayInverted {
                delay: self.reconnect_delay,
                max: self.reconnect_delay_max,
            });
        }
        if self.usec_timeout >= 1_000_000 {
            return Err(ConfigError::MicrosTimeout(self.usec_timeout));
        }
        if self.sec_timeout == 0 && self.usec_timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Response timeout of a single read.
    pub fn timeout(&self) -> MicrosDurationU64 {
        MicrosDurationU64::micros(self.sec_timeout as u64 * 1_000_000 + self.usec_timeout as u64)
    }

    pub fn reconnect_delay(&self) -> MicrosDurationU64 {
        MicrosDurationU64::secs(self.reconnect_delay)
    }

    pub fn reconnect_delay_max(&self) -> MicrosDurationU64 {
        MicrosDurationU64::secs(self.reconnect_delay_max)
    }

    fn default_port() -> u32 {
        502
    }

    fn default_baud() -> u32 {
        9600
    }

    fn default_slave_id() -> u8 {
        1
    }

    fn default_sec_timeout() -> u32 {
        1
    }

    fn default_reconnect_delay() -> u64 {
        1
    }

    fn default_reconnect_delay_max() -> u64 {
        60
    }

    fn default_exponential() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp() -> Config {
        Config {
            use_tcp: true,
            host: "192.168.1.50".to_string(),
            ..Config::default()
        }
    }

    fn rtu() -> Config {
        Config {
            device: "/dev/ttyUSB0".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port, 502);
        assert_eq!(config.baud, 9600);
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.timeout().to_micros(), 1_000_000);
        assert_eq!(config.reconnect_delay().to_secs(), 1);
        assert_eq!(config.reconnect_delay_max().to_secs(), 60);
        assert!(config.exponential);
        assert!(!config.debug);
    }

    #[test]
    fn valid_configs() {
        assert!(tcp().validate().is_ok());
        assert!(rtu().validate().is_ok());
    }

    #[test]
    fn slave_id_range() {
        for slave_id in [0, 248] {
            let config = Config { slave_id, ..tcp() };
            assert!(matches!(config.validate(), Err(ConfigError::SlaveId(_))));
        }
        assert!(Config { slave_id: 247, ..tcp() }.validate().is_ok());
    }

    #[test]
    fn link_specific_checks() {
        let config = Config { port: 0, ..tcp() };
        assert!(matches!(config.validate(), Err(ConfigError::Port(0))));
        let config = Config { port: 65536, ..tcp() };
        assert!(matches!(config.validate(), Err(ConfigError::Port(65536))));
        let config = Config { host: String::new(), ..tcp() };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyHost)));

        let config = Config { baud: 0, ..rtu() };
        assert!(matches!(config.validate(), Err(ConfigError::Baud)));
        assert!(matches!(Config::default().validate(), Err(ConfigError::EmptyDevice)));
    }

    #[test]
    fn reconnect_delays() {
        let config = Config { reconnect_delay: 0, ..tcp() };
        assert!(matches!(config.validate(), Err(ConfigError::ReconnectDelay)));
        let config = Config {
            reconnect_delay: 10,
            reconnect_delay_max: 5,
            ..tcp()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReconnectDelayInverted { delay: 10, max: 5 })
        ));

        let config = Config {
            reconnect_delay: 3,
            reconnect_delay_max: 120,
            ..tcp()
        };
        assert_eq!(config.reconnect_delay().to_micros(), 3_000_000);
        assert_eq!(config.reconnect_delay_max().to_millis(), 120_000);
    }

    #[test]
    fn timeouts() {
        let config = Config {
            sec_timeout: 0,
            usec_timeout: 0,
            ..tcp()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));

        let config = Config {
            sec_timeout: 0,
            usec_timeout: 1_000_000,
            ..tcp()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MicrosTimeout(_))));

        let config = Config {
            sec_timeout: 0,
            usec_timeout: 500_000,
            ..tcp()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout().to_millis(), 500);
    }

    #[test]
    fn yaml_with_defaults() {
        let config = Config::from_yaml_str(
            "use_tcp: true\nhost: inverter.local\nslave_id: 2\nusec_timeout: 250000\n",
        )
        .unwrap();
        assert_eq!(
            config,
            Config {
                use_tcp: true,
                host: "inverter.local".to_string(),
                slave_id: 2,
                usec_timeout: 250_000,
                ..Config::default()
            }
        );
        assert_eq!(config.timeout().to_micros(), 1_250_000);
    }

    #[test]
    fn yaml_is_validated() {
        assert!(matches!(
            Config::from_yaml_str("use_tcp: true\nhost: x\nport: 70000\n"),
            Err(ConfigError::Port(70000))
        ));
        assert!(matches!(
            Config::from_yaml_str("slave_id: [1]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/fronius.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
