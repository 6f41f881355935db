//! sd-mmc-card - Configuration
//!
//! The validated configuration values handed over by whoever generates the
//! firmware setup code, plus the errors detected before any hardware is used.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::bus::{BusConfiguration, GpioCaps};
use crate::host::MountOpts;
use crate::path::PathError;

/// Errors detected while turning configuration into live objects. All of
/// these are fatal at setup time.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 4-bit mode needs data1, data2 and data3
    MissingDataPin(DataLine),
    /// Pin does not exist, or cannot drive the line it was given
    InvalidPin { role: PinRole, pin: u8 },
    /// The same GPIO was given two jobs
    DuplicatePin { pin: u8, first: PinRole, second: PinRole },
    /// File-based sensor or action without a path, by config key
    MissingPath(&'static str),
    /// Path that can never name a file on the card
    InvalidPath(PathError),
    /// Sensor type key we don't know about
    UnknownSensorType,
    /// An explicit peripheral reference that names nothing
    UnknownPeripheral,
    /// The same peripheral id was declared twice
    DuplicateInstance,
    /// No explicit reference given and no default instance exists
    Unresolved,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingDataPin(line) => {
                write!(f, "4-bit mode requires {:?} to be set", line)
            }
            ConfigError::InvalidPin { role, pin } => {
                write!(f, "GPIO{} cannot be used as {:?}", pin, role)
            }
            ConfigError::DuplicatePin { pin, first, second } => write!(
                f,
                "GPIO{} is used for both {:?} and {:?}",
                pin, first, second
            ),
            ConfigError::MissingPath(key) => write!(f, "{} requires a path", key),
            ConfigError::InvalidPath(e) => write!(f, "invalid path: {:?}", e),
            ConfigError::UnknownSensorType => f.write_str("unknown sensor type"),
            ConfigError::UnknownPeripheral => f.write_str("unknown peripheral reference"),
            ConfigError::DuplicateInstance => f.write_str("peripheral declared twice"),
            ConfigError::Unresolved => f.write_str("no default SD/MMC peripheral declared"),
        }
    }
}

/// The optional data lines, only used in 4-bit mode.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataLine {
    D1,
    D2,
    D3,
}

/// What a GPIO is used for on the SD/MMC bus.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinRole {
    Clk,
    Cmd,
    Data0,
    Data1,
    Data2,
    Data3,
    PowerCtrl,
}

/// Numeric sensor types.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SensorType {
    TotalSpace,
    UsedSpace,
    FreeSpace,
    Frequency,
    FileSize,
}

impl FromStr for SensorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_space" => Ok(SensorType::TotalSpace),
            "used_space" => Ok(SensorType::UsedSpace),
            "free_space" => Ok(SensorType::FreeSpace),
            "frequency" => Ok(SensorType::Frequency),
            "file_size" => Ok(SensorType::FileSize),
            _ => Err(ConfigError::UnknownSensorType),
        }
    }
}

impl From<SensorType> for ObserverKind {
    fn from(ty: SensorType) -> Self {
        match ty {
            SensorType::TotalSpace => ObserverKind::TotalSpace,
            SensorType::UsedSpace => ObserverKind::UsedSpace,
            SensorType::FreeSpace => ObserverKind::FreeSpace,
            SensorType::Frequency => ObserverKind::Frequency,
            SensorType::FileSize => ObserverKind::FileSize,
        }
    }
}

/// Text sensor types.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextSensorType {
    CardType,
    FileContent,
    FsType,
}

impl FromStr for TextSensorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sd_card_type" => Ok(TextSensorType::CardType),
            "file_content" => Ok(TextSensorType::FileContent),
            "fs_type" => Ok(TextSensorType::FsType),
            _ => Err(ConfigError::UnknownSensorType),
        }
    }
}

impl From<TextSensorType> for ObserverKind {
    fn from(ty: TextSensorType) -> Self {
        match ty {
            TextSensorType::CardType => ObserverKind::CardType,
            TextSensorType::FileContent => ObserverKind::FileContent,
            TextSensorType::FsType => ObserverKind::FsType,
        }
    }
}

/// Every metric an observer can be bound to.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObserverKind {
    TotalSpace,
    UsedSpace,
    FreeSpace,
    Frequency,
    FileSize,
    CardType,
    FileContent,
    FsType,
}

impl ObserverKind {
    /// Whether a binding of this kind must name a file.
    pub fn requires_path(self) -> bool {
        match self {
            ObserverKind::FileSize | ObserverKind::FileContent => true,
            ObserverKind::TotalSpace
            | ObserverKind::UsedSpace
            | ObserverKind::FreeSpace
            | ObserverKind::Frequency
            | ObserverKind::CardType
            | ObserverKind::FsType => false,
        }
    }

    /// Whether this kind publishes text rather than a number.
    pub fn is_text(self) -> bool {
        match self {
            ObserverKind::CardType | ObserverKind::FileContent | ObserverKind::FsType => true,
            ObserverKind::TotalSpace
            | ObserverKind::UsedSpace
            | ObserverKind::FreeSpace
            | ObserverKind::Frequency
            | ObserverKind::FileSize => false,
        }
    }

    /// The configuration key for this kind.
    pub fn key(self) -> &'static str {
        match self {
            ObserverKind::TotalSpace => "total_space",
            ObserverKind::UsedSpace => "used_space",
            ObserverKind::FreeSpace => "free_space",
            ObserverKind::Frequency => "frequency",
            ObserverKind::FileSize => "file_size",
            ObserverKind::CardType => "sd_card_type",
            ObserverKind::FileContent => "file_content",
            ObserverKind::FsType => "fs_type",
        }
    }
}

/// One `sensor:` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub sensor_type: SensorType,
    pub path: Option<String>,
    /// Explicit peripheral id; `None` binds to the default instance.
    pub peripheral: Option<String>,
}

impl SensorConfig {
    pub fn new(sensor_type: SensorType) -> Self {
        SensorConfig {
            sensor_type,
            path: None,
            peripheral: None,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(String::from(path));
        self
    }

    pub fn with_peripheral(mut self, id: &str) -> Self {
        self.peripheral = Some(String::from(id));
        self
    }
}

/// One `text_sensor:` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSensorConfig {
    pub sensor_type: TextSensorType,
    pub path: Option<String>,
    /// Explicit peripheral id; `None` binds to the default instance.
    pub peripheral: Option<String>,
}

impl TextSensorConfig {
    pub fn new(sensor_type: TextSensorType) -> Self {
        TextSensorConfig {
            sensor_type,
            path: None,
            peripheral: None,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(String::from(path));
        self
    }

    pub fn with_peripheral(mut self, id: &str) -> Self {
        self.peripheral = Some(String::from(id));
        self
    }
}

/// Default interval between two sensor refreshes.
pub const DEFAULT_UPDATE_INTERVAL_MS: u32 = 60_000;

/// Everything needed to build one peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct SdMmcConfig {
    pub clk_pin: u8,
    pub cmd_pin: u8,
    pub data0_pin: u8,
    pub data1_pin: Option<u8>,
    pub data2_pin: Option<u8>,
    pub data3_pin: Option<u8>,
    pub mode_1bit: bool,
    pub power_ctrl_pin: Option<u8>,
    pub mount: MountOpts,
    pub update_interval_ms: u32,
    /// Sensors declared alongside this card. `SdMmcCard::from_config` does
    /// not look at these, the sinks only exist on the caller's side; hand
    /// each one to `Instances::bind_sensor` together with its sink.
    pub sensors: Vec<SensorConfig>,
    /// Same as `sensors`, bound with `Instances::bind_text_sensor`.
    pub text_sensors: Vec<TextSensorConfig>,
}

impl Default for SdMmcConfig {
    /// The wiring used on most ESP32 boards with a 4-bit slot.
    fn default() -> Self {
        SdMmcConfig {
            clk_pin: 14,
            cmd_pin: 15,
            data0_pin: 2,
            data1_pin: Some(4),
            data2_pin: Some(12),
            data3_pin: Some(13),
            mode_1bit: false,
            power_ctrl_pin: None,
            mount: MountOpts::default(),
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            sensors: Vec::new(),
            text_sensors: Vec::new(),
        }
    }
}

impl SdMmcConfig {
    /// Validate the pin assignment against a platform.
    pub fn bus_configuration(&self, caps: &GpioCaps) -> Result<BusConfiguration, ConfigError> {
        BusConfiguration::configure(
            caps,
            self.clk_pin,
            self.cmd_pin,
            self.data0_pin,
            self.data1_pin,
            self.data2_pin,
            self.data3_pin,
            self.mode_1bit,
            self.power_ctrl_pin,
        )
    }
}
