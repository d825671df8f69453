//! Process-wide config store (C1).
//!
//! Loaded exactly once at startup from a YAML document, then shared behind
//! an `Arc` so the single-write-before-any-read invariant is enforced by
//! construction rather than by a runtime guard: once a `Config` exists there
//! is no remaining path to mutate it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{PublisherError, PublisherResult};

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filename")]
    pub filename: String,
    #[serde(default = "default_log_level")]
    pub level: i64,
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_log_filename() -> String {
    "stdout".to_string()
}

fn default_log_level() -> i64 {
    2 // info
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filename: default_log_filename(),
            level: default_log_level(),
            pattern: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_checking_rate")]
    pub checking_rate: u32,
}

fn default_address() -> String {
    "*".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_max_message_size() -> usize {
    1 << 20
}
fn default_checking_rate() -> u32 {
    200
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            checking_rate: default_checking_rate(),
        }
    }
}

/// Raw per-sensor sub-tree: the keys common to every sensor, plus whatever
/// type-specific extras the document carries. Readers pull their own keys
/// out of `extra` and report a `MissingKey` error if one is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorParams {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub topic: String,
    pub rate: u32,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SensorParams {
    pub fn get_str(&self, sensor: &str, key: &str) -> PublisherResult<String> {
        self.extra
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PublisherError::MissingKey {
                sensor: sensor.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_u64(&self, sensor: &str, key: &str) -> PublisherResult<u64> {
        self.extra
            .get(key)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| PublisherError::MissingKey {
                sensor: sensor.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_f64_opt(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_u64_opt(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub app: AppConfig,
    pub sensors: Vec<String>,

    #[serde(flatten)]
    pub sensor_params: HashMap<String, SensorParams>,
}

/// Process-wide, read-mostly config store.
#[derive(Debug, Clone)]
pub struct Config {
    pub log: LogConfig,
    pub app: AppConfig,
    pub sensors: Vec<String>,
    params: HashMap<String, SensorParams>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> PublisherResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PublisherError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> PublisherResult<Self> {
        let raw: RawConfig =
            serde_yaml::from_str(text).map_err(|source| PublisherError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            log: raw.log,
            app: raw.app,
            sensors: raw.sensors,
            params: raw.sensor_params,
        })
    }

    /// Looks up the parameter sub-tree for a configured sensor. Unknown keys
    /// for the sensor are carried but never interpreted here; absence of a
    /// section entirely means the sensor name wasn't given its own keyed
    /// sub-tree in the document.
    pub fn sensor(&self, name: &str) -> Option<&SensorParams> {
        self.params.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
log:
  filename: stdout
  level: 2
app:
  port: 9100
  checking_rate: 100
sensors: [info, imu0]
info:
  type: Status
  topic: status
  rate: 1
  cmd: "echo hi"
imu0:
  type: Imu
  topic: imu
  rate: 50
  port: /dev/ttyUSB0
  baud_rate: 115200
"#;

    #[test]
    fn parses_top_level_sections() {
        let cfg = Config::parse(DOC, Path::new("test.yaml")).unwrap();
        assert_eq!(cfg.app.port, 9100);
        assert_eq!(cfg.app.checking_rate, 100);
        assert_eq!(cfg.sensors, vec!["info", "imu0"]);
    }

    #[test]
    fn exposes_sensor_extras() {
        let cfg = Config::parse(DOC, Path::new("test.yaml")).unwrap();
        let imu = cfg.sensor("imu0").expect("imu0 section");
        assert_eq!(imu.msg_type, "Imu");
        assert_eq!(imu.rate, 50);
        assert_eq!(imu.get_str("imu0", "port").unwrap(), "/dev/ttyUSB0");
        assert_eq!(imu.get_u64("imu0", "baud_rate").unwrap(), 115200);
    }

    #[test]
    fn missing_key_is_an_error_not_a_panic() {
        let cfg = Config::parse(DOC, Path::new("test.yaml")).unwrap();
        let info = cfg.sensor("info").expect("info section");
        let err = info.get_str("info", "nonexistent").unwrap_err();
        assert!(matches!(err, PublisherError::MissingKey { .. }));
    }

    #[test]
    fn unknown_sensor_returns_none() {
        let cfg = Config::parse(DOC, Path::new("test.yaml")).unwrap();
        assert!(cfg.sensor("ghost").is_none());
    }
}
