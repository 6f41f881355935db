//! sd-mmc-card - Peripheral instances
//!
//! Every declared card gets an id. The first one declared becomes the
//! default, used by any sensor or action that doesn't name a card. The table
//! lives as long as the firmware does; there is no way to take a card out.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

#[cfg(feature = "log")]
use log::{debug, info};

#[cfg(feature = "defmt-log")]
use defmt::{debug, info};

use crate::action::{FsAction, FsOperation, Templatable};
use crate::card::SdMmcDevice;
use crate::config::{ConfigError, SensorConfig, TextSensorConfig};
use crate::observer::{ObserverBinding, Sensor, TextSensor};

/// A card, shared between the main loop, its actions and the setup code.
pub type CardHandle = Rc<RefCell<dyn SdMmcDevice>>;

/// The default slot had already been taken.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AlreadyClaimed;

/// Holds the default card. Can be claimed once.
#[derive(Default)]
pub struct DefaultInstanceSlot {
    instance: Option<CardHandle>,
}

impl DefaultInstanceSlot {
    pub const fn new() -> Self {
        DefaultInstanceSlot { instance: None }
    }

    pub fn claim(&mut self, instance: CardHandle) -> Result<(), AlreadyClaimed> {
        if self.instance.is_some() {
            return Err(AlreadyClaimed);
        }
        self.instance = Some(instance);
        Ok(())
    }

    pub fn resolve(&self) -> Result<CardHandle, ConfigError> {
        self.instance.clone().ok_or(ConfigError::Unresolved)
    }

    pub fn is_claimed(&self) -> bool {
        self.instance.is_some()
    }
}

/// All declared cards, by id, in declaration order.
#[derive(Default)]
pub struct Instances {
    default: DefaultInstanceSlot,
    declared: Vec<(String, CardHandle)>,
}

impl Instances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a card. Each id may only be declared once.
    pub fn declare(&mut self, id: &str, instance: CardHandle) -> Result<(), ConfigError> {
        if self.declared.iter().any(|(known, _)| known == id) {
            return Err(ConfigError::DuplicateInstance);
        }
        if self.default.claim(instance.clone()).is_ok() {
            info!("SD/MMC card '{}' is the default", id);
        }
        self.declared.push((String::from(id), instance));
        Ok(())
    }

    /// Find the card named by `reference`, or the default one.
    pub fn get(&self, reference: Option<&str>) -> Result<CardHandle, ConfigError> {
        match reference {
            Some(id) => self
                .declared
                .iter()
                .find(|(known, _)| known == id)
                .map(|(_, instance)| instance.clone())
                .ok_or(ConfigError::UnknownPeripheral),
            None => self.default.resolve(),
        }
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    pub fn bind_sensor<S>(&self, config: &SensorConfig, sink: &Rc<RefCell<S>>) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        let card = self.get(config.peripheral.as_deref())?;
        let mut binding = ObserverBinding::sensor(config.sensor_type, sink);
        if let Some(path) = &config.path {
            binding = binding.with_path(path)?;
        }
        debug!("Binding {} sensor", binding.kind().key());
        let result = card.borrow_mut().register(binding);
        result
    }

    pub fn bind_text_sensor<S>(
        &self,
        config: &TextSensorConfig,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: TextSensor + 'static,
    {
        let card = self.get(config.peripheral.as_deref())?;
        let mut binding = ObserverBinding::text_sensor(config.sensor_type, sink);
        if let Some(path) = &config.path {
            binding = binding.with_path(path)?;
        }
        debug!("Binding {} text sensor", binding.kind().key());
        let result = card.borrow_mut().register(binding);
        result
    }

    /// Build an action against the card named by `reference`, or the default one.
    pub fn action(
        &self,
        reference: Option<&str>,
        path: Templatable<String>,
        op: FsOperation,
    ) -> Result<FsAction, ConfigError> {
        FsAction::new(self.get(reference)?, path, op)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bus::{BusConfiguration, GpioCaps};
    use crate::card::SdMmcCard;
    use crate::config::{SensorType, TextSensorType};
    use crate::host::MemoryCard;

    fn card() -> CardHandle {
        let bus =
            BusConfiguration::configure(&GpioCaps::ESP32, 14, 15, 2, None, None, None, true, None)
                .unwrap();
        Rc::new(RefCell::new(SdMmcCard::new(bus, MemoryCard::new(1024 * 1024))))
    }

    struct Ignore;

    impl Sensor for Ignore {
        fn publish_state(&mut self, _state: Option<u64>) {}
    }

    #[test]
    fn slot_is_claimed_once() {
        let mut slot = DefaultInstanceSlot::new();
        assert_eq!(slot.resolve().err(), Some(ConfigError::Unresolved));
        let first = card();
        slot.claim(first.clone()).unwrap();
        assert_eq!(slot.claim(card()), Err(AlreadyClaimed));
        assert!(Rc::ptr_eq(&slot.resolve().unwrap(), &first));
    }

    #[test]
    fn default_is_first_declared() {
        let mut instances = Instances::new();
        assert_eq!(instances.get(None).err(), Some(ConfigError::Unresolved));

        let (a, b) = (card(), card());
        instances.declare("sd_a", a.clone()).unwrap();
        instances.declare("sd_b", b.clone()).unwrap();
        assert_eq!(
            instances.declare("sd_a", card()).err(),
            Some(ConfigError::DuplicateInstance)
        );
        assert_eq!(instances.len(), 2);

        assert!(Rc::ptr_eq(&instances.get(None).unwrap(), &a));
        assert!(Rc::ptr_eq(&instances.get(Some("sd_b")).unwrap(), &b));
        assert_eq!(
            instances.get(Some("sd_c")).err(),
            Some(ConfigError::UnknownPeripheral)
        );
    }

    #[test]
    fn binding_from_config() {
        let mut instances = Instances::new();
        let sink = Rc::new(RefCell::new(Ignore));
        assert_eq!(
            instances.bind_sensor(&SensorConfig::new(SensorType::UsedSpace), &sink),
            Err(ConfigError::Unresolved)
        );

        instances.declare("sd", card()).unwrap();
        instances
            .bind_sensor(&SensorConfig::new(SensorType::UsedSpace), &sink)
            .unwrap();
        assert_eq!(
            instances.bind_sensor(&SensorConfig::new(SensorType::FileSize), &sink),
            Err(ConfigError::MissingPath("file_size"))
        );
        assert_eq!(
            instances.bind_sensor(
                &SensorConfig::new(SensorType::FileSize)
                    .with_path("/a")
                    .with_peripheral("other"),
                &sink
            ),
            Err(ConfigError::UnknownPeripheral)
        );
        instances
            .bind_sensor(
                &SensorConfig::new(SensorType::FileSize)
                    .with_path("/a")
                    .with_peripheral("sd"),
                &sink,
            )
            .unwrap();

        struct Text;
        impl TextSensor for Text {
            fn publish_state(&mut self, _state: Option<&str>) {}
        }
        let text = Rc::new(RefCell::new(Text));
        instances
            .bind_text_sensor(&TextSensorConfig::new(TextSensorType::FsType), &text)
            .unwrap();
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
