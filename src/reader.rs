//! Reader abstraction and registry (C4).
//!
//! Concrete reader kinds self-register by message-type tag through
//! [`register_builtin_readers`], called once from the pipeline entry point
//! before any reader is constructed (§9: a plain init function stands in
//! for the donor's static-registration-before-`main` trick, which has no
//! safe equivalent here). The registry's map is built fresh by that call,
//! not lazily on first use, so there is no cross-translation-unit
//! initialization-order hazard to reason about.

use std::collections::HashMap;
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;

use crate::config::SensorParams;
use crate::error::{PublisherError, PublisherResult};
use crate::frame::FrameBuilder;

/// Per-sensor sampling contract. `read()` is called from exactly one
/// producer thread; implementations that drive a background device thread
/// must synchronize their producer-visible state themselves (§4.4).
///
/// `None` means "no new sample this tick" and is not an error — fatal
/// failures only ever occur at construction time, never from `read()`.
pub trait Reader: Send {
    fn read(&mut self) -> Option<FrameBuilder>;
}

type Constructor = Arc<dyn Fn(&str, &SensorParams) -> PublisherResult<Box<dyn Reader>> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    factories: Mutex<HashMap<String, Constructor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a constructor under `type_tag`. Returns `true` on insert,
    /// `false` (and logs critical) if the tag is already registered — the
    /// first registrant wins.
    pub fn register<F>(&self, type_tag: &str, constructor: F) -> bool
    where
        F: Fn(&str, &SensorParams) -> PublisherResult<Box<dyn Reader>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.lock();
        if factories.contains_key(type_tag) {
            error!("critical: duplicate registration for message type '{type_tag}'");
            return false;
        }
        factories.insert(type_tag.to_string(), Arc::new(constructor));
        true
    }

    /// Constructs a reader for `sensor_name` using the registered
    /// constructor for `params.msg_type`. Unknown tags and construction
    /// failures are both reported as `Err`; the pipeline setup code is
    /// responsible for logging and skipping the sensor (§7).
    pub fn create(
        &self,
        sensor_name: &str,
        params: &SensorParams,
    ) -> PublisherResult<Box<dyn Reader>> {
        let constructor = {
            let factories = self.factories.lock();
            factories.get(params.msg_type.as_str()).cloned()
        };
        match constructor {
            Some(ctor) => ctor(sensor_name, params),
            None => Err(PublisherError::UnknownType {
                sensor: sensor_name.to_string(),
                msg_type: params.msg_type.clone(),
            }),
        }
    }
}

/// Registers every built-in reader kind. Called once, before the pipeline
/// constructs any readers.
pub fn register_builtin_readers(registry: &Registry) {
    crate::readers::status::register(registry);
    crate::readers::imu::register(registry);
    crate::readers::camera::register(registry);
    crate::readers::lidar::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(msg_type: &str) -> SensorParams {
        let yaml = format!("type: {msg_type}\ntopic: t\nrate: 1\n");
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let registry = Registry::new();
        assert!(registry.register("Status", |_, _| Err(PublisherError::UnknownType {
            sensor: "x".into(),
            msg_type: "Status".into()
        })));
        assert!(!registry.register("Status", |_, _| Err(PublisherError::UnknownType {
            sensor: "y".into(),
            msg_type: "Status".into()
        })));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry = Registry::new();
        let p = params("Bogus");
        let err = registry.create("s", &p).unwrap_err();
        assert!(matches!(err, PublisherError::UnknownType { .. }));
    }

    #[test]
    fn builtin_readers_cover_all_four_tags() {
        let registry = Registry::new();
        register_builtin_readers(&registry);
        for tag in ["Status", "Imu", "Image", "PointCloud"] {
            let yaml = match tag {
                "Status" => "type: Status\ntopic: t\nrate: 1\ncmd: \"echo hi\"\n".to_string(),
                "Imu" => "type: Imu\ntopic: t\nrate: 1\nport: /dev/null\nbaud_rate: 115200\n"
                    .to_string(),
                "Image" => "type: Image\ntopic: t\nrate: 1\nport: /dev/video0\nwidth: 640\nheight: 480\nfps: 10\nenc_pipeline: test\n"
                    .to_string(),
                "PointCloud" => "type: PointCloud\ntopic: t\nrate: 1\ncloud_size: 100\n".to_string(),
                _ => unreachable!(),
            };
            let p: SensorParams = serde_yaml::from_str(&yaml).unwrap();
            assert!(
                registry.create("s", &p).is_ok(),
                "constructing a {tag} reader should succeed"
            );
        }
        let p = params("Bogus");
        assert!(registry.create("s", &p).is_err());
    }
}
