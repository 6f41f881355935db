//! sd-mmc-card - Card peripheral
//!
//! Ties a bus configuration, a card session and the observers together, and
//! runs the periodic refresh.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embedded_hal::digital::v2::OutputPin;
#[cfg(feature = "log")]
use log::{debug, error, info, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, error, info, warn};

use crate::bus::{BusConfiguration, GpioCaps};
use crate::config::{
    ConfigError, SdMmcConfig, SensorType, TextSensorType, DEFAULT_UPDATE_INTERVAL_MS,
};
use crate::host::{MountOpts, SdMmcHost};
use crate::observer::{ObserverBinding, ObserverRegistry, Sensor, TextSensor};
use crate::path::SdPath;
use crate::session::{
    CardSession, FileInfo, IoError, MountError, MountState, NoPowerPin, Ready,
};

/// What consumers of a card (actions, generated setup code) get to use,
/// whatever driver and power pin sit underneath.
pub trait SdMmcDevice {
    fn state(&self) -> MountState;
    fn read(&mut self, path: &str) -> Result<Vec<u8>, IoError>;
    fn write(&mut self, path: &str, data: &[u8], append: bool) -> Result<(), IoError>;
    fn remove(&mut self, path: &str) -> Result<(), IoError>;
    fn make_directory(&mut self, path: &str) -> Result<(), IoError>;
    fn remove_directory(&mut self, path: &str) -> Result<(), IoError>;
    fn file_size(&mut self, path: &str) -> Result<u64, IoError>;
    fn is_directory(&mut self, path: &str) -> bool;
    fn list_directory(&mut self, path: &str, depth: u8) -> Result<Vec<FileInfo>, IoError>;
    fn register(&mut self, binding: ObserverBinding) -> Result<(), ConfigError>;
    /// Refresh usage and push every observer.
    fn update_sensors(&mut self);
}

/// An SD/MMC card in a slot.
pub struct SdMmcCard<H, P = NoPowerPin>
where
    H: SdMmcHost,
    P: OutputPin,
{
    bus: BusConfiguration,
    session: CardSession<H>,
    power: Option<P>,
    observers: ObserverRegistry,
    update_interval_ms: u32,
    last_update_ms: Option<u32>,
}

impl<H> SdMmcCard<H, NoPowerPin>
where
    H: SdMmcHost,
{
    pub fn new(bus: BusConfiguration, host: H) -> Self {
        Self::with_mount_opts(bus, host, MountOpts::default())
    }

    pub fn with_mount_opts(bus: BusConfiguration, host: H, opts: MountOpts) -> Self {
        SdMmcCard {
            bus,
            session: CardSession::new(host, opts),
            power: None,
            observers: ObserverRegistry::new(),
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            last_update_ms: None,
        }
    }

    /// Validate `config` for the platform and build the card from it.
    pub fn from_config(config: &SdMmcConfig, caps: &GpioCaps, host: H) -> Result<Self, ConfigError> {
        let bus = config.bus_configuration(caps)?;
        Ok(Self::with_mount_opts(bus, host, config.mount.clone())
            .with_update_interval(config.update_interval_ms))
    }
}

impl<H, P> SdMmcCard<H, P>
where
    H: SdMmcHost,
    P: OutputPin,
{
    /// Use `pin` to switch the card on before the handshake.
    pub fn with_power_pin<Q>(self, pin: Q) -> SdMmcCard<H, Q>
    where
        Q: OutputPin,
    {
        SdMmcCard {
            bus: self.bus,
            session: self.session,
            power: Some(pin),
            observers: self.observers,
            update_interval_ms: self.update_interval_ms,
            last_update_ms: self.last_update_ms,
        }
    }

    pub fn with_update_interval(mut self, interval_ms: u32) -> Self {
        self.update_interval_ms = interval_ms;
        self
    }

    /// Mount the card and do the first round of updates.
    ///
    /// A failure is logged and leaves the card failed for good; observers
    /// then read unavailable.
    pub fn setup(&mut self) -> Result<Ready, MountError> {
        if self.bus.power_ctrl_pin().is_some() && self.power.is_none() {
            warn!("Power control pin configured but no pin given, card may be unpowered");
        }
        let result = self.session.initialize(&self.bus, self.power.as_mut());
        match result {
            Ok(_) => {}
            Err(e) => error!("Failed to initialize SD card: {:?}", e),
        }
        self.update_sensors();
        result
    }

    /// Call from the main loop. Refreshes once every update interval; the
    /// first call only starts the clock, `setup` already did a round.
    pub fn loop_tick(&mut self, now_ms: u32) {
        match self.last_update_ms {
            None => self.last_update_ms = Some(now_ms),
            Some(last) if now_ms.wrapping_sub(last) >= self.update_interval_ms => {
                self.last_update_ms = Some(now_ms);
                self.update_sensors();
            }
            Some(_) => {}
        }
    }

    pub fn dump_config(&self) {
        info!("SD/MMC card:");
        info!("  Mode: {}-bit", self.bus.width().lines());
        info!("  CLK: GPIO{}", self.bus.clk());
        info!("  CMD: GPIO{}", self.bus.cmd());
        for (i, pin) in self.bus.data_pins().iter().enumerate() {
            info!("  DATA{}: GPIO{}", i, pin);
        }
        if let Some(pin) = self.bus.power_ctrl_pin() {
            info!("  Power control: GPIO{}", pin);
        }
        info!("  Mount point: {}", self.session.opts().mount_point);
        info!("  Update interval: {} ms", self.update_interval_ms);
        info!("  Observers: {}", self.observers.len());
        match self.session.state() {
            MountState::Mounted => {
                info!("  Card type: {}", self.session.card_type().label());
                info!("  Filesystem: {}", self.session.fs_type().label());
                info!("  Frequency: {} kHz", self.session.frequency_khz());
            }
            MountState::Failed => {
                error!("  Setup failed: {:?}", self.session.failure());
            }
            state => debug!("  State: {:?}", state),
        }
    }

    fn notify_path(&mut self, path: &str) {
        if let Ok(path) = SdPath::new(path) {
            self.observers.publish_path(&mut self.session, &path);
        }
    }

    fn register_sensor<S>(
        &mut self,
        sensor_type: SensorType,
        path: Option<&str>,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        let mut binding = ObserverBinding::sensor(sensor_type, sink);
        if let Some(path) = path {
            binding = binding.with_path(path)?;
        }
        self.observers.register(binding)
    }

    fn register_text_sensor<S>(
        &mut self,
        sensor_type: TextSensorType,
        path: Option<&str>,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: TextSensor + 'static,
    {
        let mut binding = ObserverBinding::text_sensor(sensor_type, sink);
        if let Some(path) = path {
            binding = binding.with_path(path)?;
        }
        self.observers.register(binding)
    }

    pub fn register_total_space_sensor<S>(&mut self, sink: &Rc<RefCell<S>>) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        self.register_sensor(SensorType::TotalSpace, None, sink)
    }

    pub fn register_used_space_sensor<S>(&mut self, sink: &Rc<RefCell<S>>) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        self.register_sensor(SensorType::UsedSpace, None, sink)
    }

    pub fn register_free_space_sensor<S>(&mut self, sink: &Rc<RefCell<S>>) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        self.register_sensor(SensorType::FreeSpace, None, sink)
    }

    pub fn register_frequency_sensor<S>(&mut self, sink: &Rc<RefCell<S>>) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        self.register_sensor(SensorType::Frequency, None, sink)
    }

    pub fn register_file_size_sensor<S>(
        &mut self,
        path: &str,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: Sensor + 'static,
    {
        self.register_sensor(SensorType::FileSize, Some(path), sink)
    }

    pub fn register_card_type_text_sensor<S>(
        &mut self,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: TextSensor + 'static,
    {
        self.register_text_sensor(TextSensorType::CardType, None, sink)
    }

    pub fn register_file_content_text_sensor<S>(
        &mut self,
        path: &str,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: TextSensor + 'static,
    {
        self.register_text_sensor(TextSensorType::FileContent, Some(path), sink)
    }

    pub fn register_fs_type_text_sensor<S>(
        &mut self,
        sink: &Rc<RefCell<S>>,
    ) -> Result<(), ConfigError>
    where
        S: TextSensor + 'static,
    {
        self.register_text_sensor(TextSensorType::FsType, None, sink)
    }

    pub fn bus(&self) -> &BusConfiguration {
        &self.bus
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn session(&self) -> &CardSession<H> {
        &self.session
    }

    /// For unmount / remount / format and the other session level calls.
    pub fn session_mut(&mut self) -> &mut CardSession<H> {
        &mut self.session
    }
}

impl<H, P> SdMmcDevice for SdMmcCard<H, P>
where
    H: SdMmcHost,
    P: OutputPin,
{
    fn state(&self) -> MountState {
        self.session.state()
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, IoError> {
        self.session.read(path)
    }

    fn write(&mut self, path: &str, data: &[u8], append: bool) -> Result<(), IoError> {
        self.session.write(path, data, append)?;
        self.notify_path(path);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), IoError> {
        self.session.remove(path)?;
        self.notify_path(path);
        Ok(())
    }

    fn make_directory(&mut self, path: &str) -> Result<(), IoError> {
        self.session.make_directory(path)
    }

    fn remove_directory(&mut self, path: &str) -> Result<(), IoError> {
        self.session.remove_directory(path)
    }

    fn file_size(&mut self, path: &str) -> Result<u64, IoError> {
        self.session.file_size(path)
    }

    fn is_directory(&mut self, path: &str) -> bool {
        self.session.is_directory(path)
    }

    fn list_directory(&mut self, path: &str, depth: u8) -> Result<Vec<FileInfo>, IoError> {
        self.session.list_directory(path, depth)
    }

    fn register(&mut self, binding: ObserverBinding) -> Result<(), ConfigError> {
        self.observers.register(binding)
    }

    fn update_sensors(&mut self) {
        let usage = self.session.refresh().ok();
        self.observers.publish(&mut self.session, usage);
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
