//! StatusReader (C5): runs a shell command, parses a fixed 6-field CSV
//! record off its stdout, and emits a Status frame.

use std::process::Command;
use std::sync::atomic::Ordering;

use log::debug;

use crate::clock::now_ns;
use crate::config::SensorParams;
use crate::error::{PublisherError, PublisherResult};
use crate::frame::{FrameBuilder, Payload, StatusPayload};
use crate::reader::{Reader, Registry};

use super::TOTAL_READ_BYTES;

pub struct StatusReader {
    sensor_name: String,
    topic: String,
    cmd: String,
}

impl StatusReader {
    pub fn new(sensor_name: &str, params: &SensorParams) -> PublisherResult<Self> {
        let cmd = params.get_str(sensor_name, "cmd")?;
        Ok(Self {
            sensor_name: sensor_name.to_string(),
            topic: params.topic.clone(),
            cmd,
        })
    }

    /// Parses `cpu_usage;cpu_temp;mem_usage;battery_voltage;battery_current;ip`.
    /// Any other field count is non-fatal: returns `None` (§4.5).
    fn parse(&self, stdout: &str) -> Option<StatusPayload> {
        let fields: Vec<&str> = stdout.trim().split(';').collect();
        if fields.len() != 6 {
            debug!(
                "StatusReader '{}': expected 6 fields, got {}",
                self.sensor_name,
                fields.len()
            );
            return None;
        }
        let cpu_usage: f64 = fields[0].parse().ok()?;
        let cpu_temp: f64 = fields[1].parse().ok()?;
        let mem_usage: f64 = fields[2].parse().ok()?;
        let battery_voltage: f64 = fields[3].parse().ok()?;
        let battery_current: f64 = fields[4].parse().ok()?;
        let ip = fields[5].to_string();

        let total_read_bytes = TOTAL_READ_BYTES.swap(0, Ordering::AcqRel);

        Some(StatusPayload {
            cpu_usage,
            cpu_temp,
            mem_usage,
            battery_voltage,
            battery_current,
            ip,
            total_read_bytes,
        })
    }
}

impl Reader for StatusReader {
    fn read(&mut self) -> Option<FrameBuilder> {
        let output = Command::new("sh").arg("-c").arg(&self.cmd).output().ok()?;
        if !output.status.success() {
            debug!(
                "StatusReader '{}': command exited with {}",
                self.sensor_name, output.status
            );
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = self.parse(&stdout)?;

        Some(FrameBuilder {
            sensor_name: self.sensor_name.clone(),
            topic: self.topic.clone(),
            timestamp_ns: now_ns(),
            payload: Payload::Status(payload),
        })
    }
}

pub fn register(registry: &Registry) {
    registry.register("Status", |name, params| {
        StatusReader::new(name, params)
            .map(|r| Box::new(r) as Box<dyn Reader>)
            .map_err(|e| match e {
                PublisherError::MissingKey { sensor, key } => {
                    PublisherError::ReaderInit {
                        sensor,
                        reason: format!("missing key '{key}'"),
                    }
                }
                other => other,
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(cmd: &str) -> SensorParams {
        let yaml = format!("type: Status\ntopic: status\nrate: 1\ncmd: \"{cmd}\"\n");
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn parses_six_field_record() {
        let p = params("echo hi");
        let reader = StatusReader::new("info", &p).unwrap();
        let parsed = reader
            .parse("0.1;45.2;0.3;12.1;0.8;10.0.0.1")
            .expect("valid record");
        assert_eq!(parsed.cpu_usage, 0.1);
        assert_eq!(parsed.ip, "10.0.0.1");
    }

    #[test]
    fn wrong_field_count_is_none_not_panic() {
        let p = params("echo hi");
        let reader = StatusReader::new("info", &p).unwrap();
        assert!(reader.parse("0.1;45.2;0.3").is_none());
        assert!(reader.parse("0.1;45.2;0.3;12.1;0.8;10.0.0.1;extra").is_none());
    }

    #[test]
    fn total_read_bytes_resets_to_zero_on_read() {
        TOTAL_READ_BYTES.store(512, Ordering::SeqCst);
        let p = params("echo hi");
        let reader = StatusReader::new("info", &p).unwrap();
        let parsed = reader.parse("0.1;45.2;0.3;12.1;0.8;10.0.0.1").unwrap();
        assert_eq!(parsed.total_read_bytes, 512);
        assert_eq!(TOTAL_READ_BYTES.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn end_to_end_read_against_real_shell_command() {
        let p = params(r#"echo '0.1;45.2;0.3;12.1;0.8;10.0.0.1'"#);
        let mut reader = StatusReader::new("info", &p).unwrap();
        let frame = reader.read().expect("frame from shell command");
        assert_eq!(frame.sensor_name, "info");
        match frame.payload {
            Payload::Status(p) => assert_eq!(p.ip, "10.0.0.1"),
            _ => panic!("expected status payload"),
        }
    }

    #[test]
    fn missing_cmd_key_fails_construction() {
        let yaml = "type: Status\ntopic: status\nrate: 1\n";
        let p: SensorParams = serde_yaml::from_str(yaml).unwrap();
        assert!(StatusReader::new("info", &p).is_err());
    }
}
