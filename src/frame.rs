//! Frame encoder (C3) and the typed payloads it packs (§3).
//!
//! The schema compiler that would normally generate these payload encodings
//! is out of scope; this module substitutes a small fixed binary layout
//! (one-byte type tag, length-prefixed topic, `u64` timestamp, then the
//! payload's fields in the order given in the data model) so the wire
//! contract stays concrete and testable without inventing a schema
//! language.

/// JPEG start-of-image marker; `CameraReader` output must begin with this.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Status,
    Imu,
    Image,
    PointCloud,
}

impl MessageType {
    pub fn tag(&self) -> &'static str {
        match self {
            MessageType::Status => "Status",
            MessageType::Imu => "Imu",
            MessageType::Image => "Image",
            MessageType::PointCloud => "PointCloud",
        }
    }

    fn wire_byte(&self) -> u8 {
        match self {
            MessageType::Status => 1,
            MessageType::Imu => 2,
            MessageType::Image => 3,
            MessageType::PointCloud => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub cpu_usage: f64,
    pub cpu_temp: f64,
    pub mem_usage: f64,
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub ip: String,
    pub total_read_bytes: u64,
}

/// Only the fields actually emitted on the wire (§4.6): acceleration,
/// angular velocity, and orientation quaternion. Mag/euler/pressure are
/// decoded by the reader but never packed here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuPayload {
    pub linear_acceleration: [f64; 3],
    pub angular_velocity: [f64; 3],
    pub orientation: [f64; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: &'static str,
    pub fps: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudPayload {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Status(StatusPayload),
    Imu(ImuPayload),
    Image(ImagePayload),
    PointCloud(PointCloudPayload),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Status(_) => MessageType::Status,
            Payload::Imu(_) => MessageType::Imu,
            Payload::Image(_) => MessageType::Image,
            Payload::PointCloud(_) => MessageType::PointCloud,
        }
    }
}

/// One sample, ready to be packed and prefixed with a sensor name (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuilder {
    pub sensor_name: String,
    pub topic: String,
    pub timestamp_ns: u64,
    pub payload: Payload,
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
    buf.extend_from_slice(b);
}

fn pack_body(topic: &str, timestamp_ns: u64, payload: &Payload) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(payload.message_type().wire_byte());
    write_string(&mut body, topic);
    body.extend_from_slice(&timestamp_ns.to_le_bytes());

    match payload {
        Payload::Status(p) => {
            body.extend_from_slice(&p.cpu_usage.to_le_bytes());
            body.extend_from_slice(&p.cpu_temp.to_le_bytes());
            body.extend_from_slice(&p.mem_usage.to_le_bytes());
            body.extend_from_slice(&p.battery_voltage.to_le_bytes());
            body.extend_from_slice(&p.battery_current.to_le_bytes());
            write_string(&mut body, &p.ip);
            body.extend_from_slice(&p.total_read_bytes.to_le_bytes());
        }
        Payload::Imu(p) => {
            for v in p.linear_acceleration {
                body.extend_from_slice(&v.to_le_bytes());
            }
            for v in p.angular_velocity {
                body.extend_from_slice(&v.to_le_bytes());
            }
            for v in p.orientation {
                body.extend_from_slice(&v.to_le_bytes());
            }
        }
        Payload::Image(p) => {
            body.extend_from_slice(&p.width.to_le_bytes());
            body.extend_from_slice(&p.height.to_le_bytes());
            write_string(&mut body, p.encoding);
            body.extend_from_slice(&p.fps.to_le_bytes());
            write_bytes(&mut body, &p.data);
        }
        Payload::PointCloud(p) => {
            body.extend_from_slice(&(p.points.len() as u32).to_le_bytes());
            for pt in &p.points {
                body.extend_from_slice(&pt.x.to_le_bytes());
                body.extend_from_slice(&pt.y.to_le_bytes());
                body.extend_from_slice(&pt.z.to_le_bytes());
                body.extend_from_slice(&pt.intensity.to_le_bytes());
            }
        }
    }

    body
}

impl FrameBuilder {
    /// Packs the sensor name prefix and the schema body into one contiguous
    /// buffer (§4.3). `max_size` bounds the body only; it sizes the scratch
    /// allocation and is a caller contract, not a runtime-checked limit —
    /// an oversized body is a programmer error, asserted rather than
    /// recovered from.
    pub fn encode(&self, max_size: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.sensor_name.len() + max_size);
        buf.extend_from_slice(self.sensor_name.as_bytes());
        let body = pack_body(&self.topic, self.timestamp_ns, &self.payload);
        assert!(
            body.len() <= max_size,
            "frame body for sensor '{}' ({} bytes) exceeds max_message_size ({} bytes)",
            self.sensor_name,
            body.len(),
            max_size
        );
        buf.extend_from_slice(&body);
        buf
    }
}

/// Decodes a packed body back into topic/timestamp/payload, mirroring
/// `pack_body`. Used by tests (and would be used by any downstream
/// subscriber written against this same wire contract).
pub struct DecodedFrame {
    pub topic: String,
    pub timestamp_ns: u64,
    pub payload: Payload,
}

#[derive(Debug)]
pub struct DecodeError(pub &'static str);

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or(DecodeError("truncated u32"))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64, DecodeError> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or(DecodeError("truncated u64"))?
        .try_into()
        .unwrap();
    *pos += 8;
    Ok(u64::from_le_bytes(bytes))
}

fn read_f32(buf: &[u8], pos: &mut usize) -> Result<f32, DecodeError> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or(DecodeError("truncated f32"))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(f32::from_le_bytes(bytes))
}

fn read_f64(buf: &[u8], pos: &mut usize) -> Result<f64, DecodeError> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or(DecodeError("truncated f64"))?
        .try_into()
        .unwrap();
    *pos += 8;
    Ok(f64::from_le_bytes(bytes))
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String, DecodeError> {
    let len = read_u32(buf, pos)? as usize;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or(DecodeError("truncated string"))?;
    *pos += len;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError("invalid utf8"))
}

fn read_bytes(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, DecodeError> {
    let len = read_u32(buf, pos)? as usize;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or(DecodeError("truncated bytes"))?;
    *pos += len;
    Ok(bytes.to_vec())
}

/// Decodes the body that follows a known-length `sensor_name` prefix.
/// Since the wire prefix is not itself length-delimited (§3), the caller is
/// expected to already know `sensor_name`'s length (e.g. from config) and
/// pass only the remainder here.
pub fn decode_body(body: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let mut pos = 0usize;
    let tag = *body.first().ok_or(DecodeError("empty body"))?;
    pos += 1;
    let topic = read_string(body, &mut pos)?;
    let timestamp_ns = read_u64(body, &mut pos)?;

    let payload = match tag {
        1 => Payload::Status(StatusPayload {
            cpu_usage: read_f64(body, &mut pos)?,
            cpu_temp: read_f64(body, &mut pos)?,
            mem_usage: read_f64(body, &mut pos)?,
            battery_voltage: read_f64(body, &mut pos)?,
            battery_current: read_f64(body, &mut pos)?,
            ip: read_string(body, &mut pos)?,
            total_read_bytes: read_u64(body, &mut pos)?,
        }),
        2 => {
            let mut acc = [0.0; 3];
            for v in &mut acc {
                *v = read_f64(body, &mut pos)?;
            }
            let mut gyr = [0.0; 3];
            for v in &mut gyr {
                *v = read_f64(body, &mut pos)?;
            }
            let mut quat = [0.0; 4];
            for v in &mut quat {
                *v = read_f64(body, &mut pos)?;
            }
            Payload::Imu(ImuPayload {
                linear_acceleration: acc,
                angular_velocity: gyr,
                orientation: quat,
            })
        }
        3 => {
            let width = read_u32(body, &mut pos)?;
            let height = read_u32(body, &mut pos)?;
            let encoding = read_string(body, &mut pos)?;
            let encoding: &'static str = if encoding == "jpeg" { "jpeg" } else { "unknown" };
            let fps = read_f32(body, &mut pos)?;
            let data = read_bytes(body, &mut pos)?;
            Payload::Image(ImagePayload {
                data,
                width,
                height,
                encoding,
                fps,
            })
        }
        4 => {
            let n = read_u32(body, &mut pos)? as usize;
            let mut points = Vec::with_capacity(n);
            for _ in 0..n {
                let x = read_f32(body, &mut pos)?;
                let y = read_f32(body, &mut pos)?;
                let z = read_f32(body, &mut pos)?;
                let intensity = read_f32(body, &mut pos)?;
                points.push(Point { x, y, z, intensity });
            }
            Payload::PointCloud(PointCloudPayload { points })
        }
        _ => return Err(DecodeError("unknown message type tag")),
    };

    Ok(DecodedFrame {
        topic,
        timestamp_ns,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_name_prefixes_the_frame_verbatim() {
        let f = FrameBuilder {
            sensor_name: "imu0".into(),
            topic: "imu".into(),
            timestamp_ns: 42,
            payload: Payload::Status(StatusPayload {
                cpu_usage: 0.0,
                cpu_temp: 0.0,
                mem_usage: 0.0,
                battery_voltage: 0.0,
                battery_current: 0.0,
                ip: String::new(),
                total_read_bytes: 0,
            }),
        };
        let encoded = f.encode(256);
        assert_eq!(&encoded[..4], b"imu0");
    }

    #[test]
    fn status_round_trips() {
        let f = FrameBuilder {
            sensor_name: "info".into(),
            topic: "status".into(),
            timestamp_ns: 123,
            payload: Payload::Status(StatusPayload {
                cpu_usage: 0.1,
                cpu_temp: 45.2,
                mem_usage: 0.3,
                battery_voltage: 12.1,
                battery_current: 0.8,
                ip: "10.0.0.1".into(),
                total_read_bytes: 77,
            }),
        };
        let encoded = f.encode(256);
        let decoded = decode_body(&encoded[4..]).unwrap();
        assert_eq!(decoded.topic, "status");
        assert_eq!(decoded.timestamp_ns, 123);
        match decoded.payload {
            Payload::Status(p) => {
                assert_eq!(p.cpu_usage, 0.1);
                assert_eq!(p.ip, "10.0.0.1");
                assert_eq!(p.total_read_bytes, 77);
            }
            _ => panic!("expected Status payload"),
        }
    }

    #[test]
    fn imu_round_trips_emitted_fields_only() {
        let v: Vec<f64> = (0..17).map(|i| i as f64).collect();
        let payload = ImuPayload {
            linear_acceleration: [v[0], v[1], v[2]],
            angular_velocity: [v[3], v[4], v[5]],
            orientation: [v[12], v[13], v[14], v[15]],
        };
        let f = FrameBuilder {
            sensor_name: "imu0".into(),
            topic: "imu".into(),
            timestamp_ns: 1,
            payload: Payload::Imu(payload),
        };
        let encoded = f.encode(256);
        let decoded = decode_body(&encoded[4..]).unwrap();
        match decoded.payload {
            Payload::Imu(p) => {
                assert_eq!(p.linear_acceleration, [0.0, 1.0, 2.0]);
                assert_eq!(p.angular_velocity, [3.0, 4.0, 5.0]);
                assert_eq!(p.orientation, [12.0, 13.0, 14.0, 15.0]);
            }
            _ => panic!("expected Imu payload"),
        }
    }

    #[test]
    fn image_round_trips_and_preserves_soi_marker() {
        let mut data = JPEG_SOI.to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let f = FrameBuilder {
            sensor_name: "cam0".into(),
            topic: "camera".into(),
            timestamp_ns: 7,
            payload: Payload::Image(ImagePayload {
                data: data.clone(),
                width: 640,
                height: 480,
                encoding: "jpeg",
                fps: 10.0,
            }),
        };
        let encoded = f.encode(4096);
        let decoded = decode_body(&encoded[4..]).unwrap();
        match decoded.payload {
            Payload::Image(p) => {
                assert_eq!(p.width, 640);
                assert_eq!(p.height, 480);
                assert_eq!(p.encoding, "jpeg");
                assert_eq!(&p.data[..2], &JPEG_SOI);
                assert_eq!(p.data, data);
            }
            _ => panic!("expected Image payload"),
        }
    }

    #[test]
    #[should_panic(expected = "exceeds max_message_size")]
    fn encode_asserts_on_body_overrun() {
        let f = FrameBuilder {
            sensor_name: "cam0".into(),
            topic: "camera".into(),
            timestamp_ns: 0,
            payload: Payload::Image(ImagePayload {
                data: vec![0u8; 1024],
                width: 640,
                height: 480,
                encoding: "jpeg",
                fps: 10.0,
            }),
        };
        f.encode(16);
    }
}
