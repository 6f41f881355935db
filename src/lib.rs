//! # sd-mmc-card
//!
//! > An SD/MMC card peripheral manager written in Embedded Rust
//!
//! This crate sits between the vendor's SD/MMC host driver and the rest of
//! your firmware. It validates the pin assignment, mounts the card, keeps
//! track of its capacity and usage, pushes readings into sensors and runs
//! filesystem actions (write, append, delete, mkdir, rmdir) with defined
//! failure semantics. It is `#![no_std]` but needs `alloc`.
//!
//! ## Using the crate
//!
//! You will need something that implements the `SdMmcHost` trait, usually a
//! thin wrapper around the SDK's SDMMC and FAT calls. For tests and host side
//! simulation there is `MemoryCard`.
//!
//! ```rust
//! # use std::{cell::RefCell, rc::Rc};
//! # use sd_mmc_card::{GpioCaps, MemoryCard, SdMmcCard, SdMmcConfig, SdMmcDevice, Sensor};
//! # struct Uart;
//! # impl Sensor for Uart {
//! #     fn publish_state(&mut self, state: Option<u64>) { println!("{:?}", state) }
//! # }
//! let config = SdMmcConfig {
//!     mode_1bit: true,
//!     ..Default::default()
//! };
//! let mut card = SdMmcCard::from_config(&config, &GpioCaps::ESP32, MemoryCard::new(1 << 20))
//!     .unwrap();
//! let free_space = Rc::new(RefCell::new(Uart));
//! card.register_free_space_sensor(&free_space).unwrap();
//! match card.setup() {
//!     Ok(ready) => println!("Mounted {}", ready.card_type.label()),
//!     Err(e) => println!("No card: {}", e),
//! }
//! card.write("/boot.log", b"hello\n", true).unwrap();
//! card.loop_tick(0);
//! ```
//!
//! ## Features
//!
//! * `defmt-log`: By turning off the default features and enabling the `defmt-log` feature you can
//! configure this crate to log messages over defmt instead.
//! * `refcell-host`: implement `SdMmcHost` for `RefCell<T>` and `&RefCell<T>`.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is enabled.

#![cfg_attr(not(test), no_std)]
// #![deny(missing_docs)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

extern crate alloc;


#[macro_use]
mod structure;

pub mod action;
pub mod bus;
pub mod card;
pub mod config;
pub mod csd;
pub mod fs_type;
pub mod host;
pub mod instance;
pub mod observer;
pub mod path;
pub mod session;

pub use crate::action::{FsAction, FsOperation, Templatable};
pub use crate::bus::{BusConfiguration, BusWidth, GpioCaps};
pub use crate::card::{SdMmcCard, SdMmcDevice};
pub use crate::config::{
    ConfigError, SdMmcConfig, SensorConfig, SensorType, TextSensorConfig, TextSensorType,
};
pub use crate::csd::CardType;
pub use crate::fs_type::FsType;
pub use crate::host::{DriverError, MemoryCard, MountOpts, SdMmcHost};
pub use crate::instance::{CardHandle, DefaultInstanceSlot, Instances};
pub use crate::observer::{ObserverBinding, ObserverRegistry, Sensor, TextSensor};
pub use crate::path::SdPath;
pub use crate::session::{CardSession, IoError, MountError, MountState, NoPowerPin, Usage};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
