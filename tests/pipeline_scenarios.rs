//! End-to-end scenario coverage against the public pipeline API, in the
//! style of this codebase's other integration suites: spin up the real
//! thing, drive it for a fixed wall-clock window, and assert on what came
//! out the other side.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tinysk_publisher::config::Config;
use tinysk_publisher::frame::{decode_body, Payload};
use tinysk_publisher::pipeline;

fn write_config(port: u16, rate: u32, cmd: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config file");
    writeln!(
        file,
        "log:\n  filename: stdout\napp:\n  port: {port}\n  checking_rate: 200\nsensors: [info]\ninfo:\n  type: Status\n  topic: status\n  rate: {rate}\n  cmd: \"{cmd}\"\n"
    )
    .unwrap();
    file
}

/// S1: a Status-only config at 1 Hz, run ~5 seconds, expect 4-5 frames
/// with the configured fields decoded back out correctly.
#[test]
fn s1_status_only_config_yields_expected_frame_rate_and_fields() {
    let port = 17101;
    let config_file = write_config(port, 1, r#"echo '0.1;45.2;0.3;12.1;0.8;10.0.0.1'"#);
    let config = Config::load(config_file.path()).expect("load config");

    let stop = Arc::new(AtomicBool::new(false));
    let run_stop = stop.clone();
    let handle = thread::spawn(move || pipeline::run(config, run_stop));

    thread::sleep(Duration::from_millis(300));

    let ctx = zmq::Context::new();
    let sub = ctx.socket(zmq::SUB).unwrap();
    sub.connect(&format!("tcp://127.0.0.1:{port}")).unwrap();
    sub.set_subscribe(b"").unwrap();

    let mut frames = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_millis(5000);
    while std::time::Instant::now() < deadline {
        if let Ok(msg) = sub.recv_bytes(zmq::DONTWAIT) {
            frames.push(msg);
        }
        thread::sleep(Duration::from_millis(20));
    }

    stop.store(true, Ordering::SeqCst);
    let _ = handle.join();

    assert!(
        frames.len() >= 3 && frames.len() <= 6,
        "expected roughly 4-5 one-Hz status frames over 5s, got {}",
        frames.len()
    );

    for msg in &frames {
        assert!(msg.starts_with(b"info"));
        let decoded = decode_body(&msg[4..]).expect("decodable body");
        match decoded.payload {
            Payload::Status(p) => {
                assert_eq!(p.cpu_usage, 0.1);
                assert_eq!(p.ip, "10.0.0.1");
            }
            _ => panic!("expected a Status payload"),
        }
    }
}

/// S6 (pipeline-level view): a sensor listed in `sensors` but missing its
/// parameter section is skipped, not fatal to the rest of the pipeline.
#[test]
fn sensor_missing_parameter_section_is_skipped_not_fatal() {
    let port = 17102;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "log:\n  filename: stdout\napp:\n  port: {port}\nsensors: [ghost, info]\ninfo:\n  type: Status\n  topic: status\n  rate: 5\n  cmd: \"echo '0.1;45.2;0.3;12.1;0.8;10.0.0.1'\"\n"
    )
    .unwrap();
    let config = Config::load(file.path()).expect("load config");

    let stop = Arc::new(AtomicBool::new(false));
    let run_stop = stop.clone();
    let handle = thread::spawn(move || pipeline::run(config, run_stop));

    thread::sleep(Duration::from_millis(300));

    let ctx = zmq::Context::new();
    let sub = ctx.socket(zmq::SUB).unwrap();
    sub.connect(&format!("tcp://127.0.0.1:{port}")).unwrap();
    sub.set_subscribe(b"").unwrap();

    let mut got_info = false;
    for _ in 0..50 {
        if let Ok(msg) = sub.recv_bytes(zmq::DONTWAIT) {
            if msg.starts_with(b"info") {
                got_info = true;
                break;
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    stop.store(true, Ordering::SeqCst);
    let _ = handle.join();

    assert!(got_info, "the 'info' sensor should still publish despite 'ghost' being unconstructible");
}
