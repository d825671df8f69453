//! Pipeline / Publisher (C10): one producer thread per configured sensor
//! feeding a single consumer thread that publishes frames to the network
//! (§4.10).
//!
//! The in-process hand-off queue is a bounded `crossbeam` channel, the
//! same primitive the rest of this codebase's producer/consumer pipelines
//! use internally; the conflated, network-facing leg is a `zmq` `PUB`
//! socket with `ZMQ_CONFLATE` set, bound to the configured `tcp://`
//! endpoint. The spec's "inproc://" inner queue and the bounded
//! in-process channel serve the same role here: a bounded hand-off
//! between producers and the single consumer that owns the publish
//! socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender, TryRecvError};
use log::{debug, error, info};

use crate::config::Config;
use crate::error::{PublisherError, PublisherResult};
use crate::rate::Rate;
use crate::reader::{register_builtin_readers, Reader, Registry};
use crate::readers::TOTAL_READ_BYTES;

const QUEUE_CAPACITY: usize = 1024;

fn producer_loop(
    sensor_name: String,
    mut reader: Box<dyn Reader>,
    rate_hz: u32,
    tx: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    max_message_size: usize,
) {
    let mut rate = Rate::new(rate_hz);
    while !stop.load(Ordering::Relaxed) {
        match reader.read() {
            Some(frame) => {
                let bytes = frame.encode(max_message_size);
                if tx.send(bytes).is_err() {
                    debug!("{sensor_name}: publish endpoint closed, producer exiting");
                    break;
                }
            }
            None => {
                debug!("{sensor_name}: no sample this tick");
            }
        }
        rate.sleep();
    }
    info!("{sensor_name}: producer thread exiting");
}

fn consumer_loop(rx: Receiver<Vec<u8>>, socket: zmq::Socket, checking_rate_hz: u32, stop: Arc<AtomicBool>) {
    let mut idle_rate = Rate::new(checking_rate_hz.max(1));
    while !stop.load(Ordering::Relaxed) {
        match rx.try_recv() {
            Ok(bytes) => {
                let len = bytes.len() as u64;
                match socket.send(bytes, 0) {
                    Ok(()) => {
                        TOTAL_READ_BYTES.fetch_add(len, Ordering::AcqRel);
                    }
                    Err(e) => {
                        error!("publish send failed: {e}");
                    }
                }
            }
            Err(TryRecvError::Empty) => {
                idle_rate.sleep();
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
    info!("consumer thread exiting");
}

fn build_readers(
    registry: &Registry,
    config: &Config,
) -> Vec<(String, Box<dyn Reader>, u32)> {
    let mut readers = Vec::new();
    for name in &config.sensors {
        let Some(params) = config.sensor(name) else {
            error!("critical: sensor '{name}' listed in `sensors` but has no parameter section; skipping");
            continue;
        };
        match registry.create(name, params) {
            Ok(reader) => readers.push((name.clone(), reader, params.rate)),
            Err(e) => {
                error!("critical: {e}");
            }
        }
    }
    readers
}

/// Runs the pipeline until `stop` is observed. Installing the signal
/// handler that flips `stop` is the caller's responsibility (the entry
/// point in `main.rs`), matching §4.10's "signal handler sets the stop
/// flag" being a concern external to the pipeline itself.
pub fn run(config: Config, stop: Arc<AtomicBool>) -> PublisherResult<()> {
    let registry = Registry::new();
    register_builtin_readers(&registry);

    let readers = build_readers(&registry, &config);
    if readers.is_empty() {
        error!("critical: no sensors could be constructed; nothing to publish");
    }

    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::PUB)?;
    socket.set_conflate(true)?;

    let endpoint = format!("tcp://{}:{}", config.app.address, config.app.port);
    socket
        .bind(&endpoint)
        .map_err(|source| PublisherError::SocketBind {
            endpoint: endpoint.clone(),
            source,
        })?;
    info!("publishing on {endpoint}");

    let (tx, rx) = crossbeam::channel::bounded::<Vec<u8>>(QUEUE_CAPACITY);
    let max_message_size = config.app.max_message_size;

    let mut producer_handles: Vec<JoinHandle<()>> = Vec::new();
    for (name, reader, rate_hz) in readers {
        let tx = tx.clone();
        let stop = stop.clone();
        producer_handles.push(thread::spawn(move || {
            producer_loop(name, reader, rate_hz, tx, stop, max_message_size);
        }));
    }
    // Drop this function's own sender so the channel disconnects once
    // every producer's clone is gone, not a moment before.
    drop(tx);

    // Shutdown order (§4.10): the consumer's resources (channel receiver,
    // publish socket) are dropped first when this call returns, which is
    // what causes producers blocked on a full channel to observe a closed
    // peer and exit; only then are producer threads joined; the messaging
    // context outlives the socket and is dropped last.
    consumer_loop(rx, socket, config.app.checking_rate, stop);

    for handle in producer_handles {
        let _ = handle.join();
    }

    drop(ctx);
    Ok(())
}
