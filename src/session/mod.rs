//! sd-mmc-card - Card Session
//!
//! Owns the mount lifecycle of one card and exposes its usage figures and
//! file primitives.
//!
//! ```text
//! Unmounted -> Mounting -> Mounted
//!                       \-> Failed
//! ```
//!
//! `Failed` is terminal until the next boot: nothing retries on its own.

use alloc::vec::Vec;
use core::fmt;

use embedded_hal::digital::v2::OutputPin;
#[cfg(feature = "log")]
use log::{debug, error, info, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, error, info, warn};

use crate::bus::{BusConfiguration, BusWidth};
use crate::csd::{CardType, Csd};
use crate::fs_type::FsType;
use crate::host::{DriverError, MountOpts, SdMmcHost, WriteMode};
use crate::path::SdPath;

/// Where the session is in its lifecycle.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Failed,
}

/// The possible errors while getting or keeping the card mounted.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MountError {
    /// Couldn't drive the power control pin
    PowerControl,
    /// No card in the slot
    CardAbsent,
    /// The card didn't complete the handshake
    HandshakeFailed,
    /// The card has no filesystem we can mount
    NoFilesystem,
    /// The card stopped answering while mounted
    CardLost,
    /// Operation needs a mounted card
    NotMounted,
    /// Any other error from the host driver
    Driver(DriverError),
}

impl MountError {
    fn from_mount(err: DriverError) -> MountError {
        match err {
            DriverError::NoCard => MountError::CardAbsent,
            DriverError::NoFilesystem => MountError::NoFilesystem,
            DriverError::Timeout => MountError::HandshakeFailed,
            DriverError::CardRemoved => MountError::CardLost,
            other => MountError::Driver(other),
        }
    }
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::PowerControl => f.write_str("failed to switch card power on"),
            MountError::CardAbsent => f.write_str("no card found"),
            MountError::HandshakeFailed => f.write_str("card handshake failed"),
            MountError::NoFilesystem => f.write_str("no filesystem on card"),
            MountError::CardLost => f.write_str("card lost"),
            MountError::NotMounted => f.write_str("card not mounted"),
            MountError::Driver(e) => write!(f, "driver error: {:?}", e),
        }
    }
}

/// The possible errors from a single file operation.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IoError {
    NotFound,
    NotAFile,
    WriteFailed,
    ReadFailed,
    PathInvalid,
    AlreadyExists,
    NotEmpty,
    NotMounted,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoError::NotFound => "not found",
            IoError::NotAFile => "not a file",
            IoError::WriteFailed => "write failed",
            IoError::ReadFailed => "read failed",
            IoError::PathInvalid => "invalid path",
            IoError::AlreadyExists => "already exists",
            IoError::NotEmpty => "directory not empty",
            IoError::NotMounted => "card not mounted",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Operation {
    Read,
    Stat,
    List,
    Write,
    Remove,
    MakeDir,
    RemoveDir,
}

impl Operation {
    fn mutates(self) -> bool {
        match self {
            Operation::Read | Operation::Stat | Operation::List => false,
            Operation::Write | Operation::Remove | Operation::MakeDir | Operation::RemoveDir => {
                true
            }
        }
    }

    /// Translate a driver error for this operation. Card loss is handled by
    /// the caller.
    fn io_error(self, err: DriverError) -> IoError {
        use Operation::*;
        match (self, err) {
            (Write, DriverError::NotFound) | (MakeDir, DriverError::NotFound) => {
                IoError::PathInvalid
            }
            (_, DriverError::NotFound) => IoError::NotFound,
            (Read, DriverError::IsADirectory)
            | (Stat, DriverError::IsADirectory)
            | (Remove, DriverError::IsADirectory) => IoError::NotAFile,
            (_, DriverError::IsADirectory) => IoError::PathInvalid,
            (Read, DriverError::NotADirectory)
            | (Stat, DriverError::NotADirectory)
            | (Remove, DriverError::NotADirectory) => IoError::NotFound,
            (_, DriverError::NotADirectory) => IoError::PathInvalid,
            (_, DriverError::AlreadyExists) => IoError::AlreadyExists,
            (_, DriverError::NotEmpty) => IoError::NotEmpty,
            (_, DriverError::InvalidName) => IoError::PathInvalid,
            (op, _) if op.mutates() => IoError::WriteFailed,
            (_, _) => IoError::ReadFailed,
        }
    }
}

/// Capacity figures, all in bytes. `used + free <= total` always holds.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Usage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Proof the card is mounted, with what the handshake found.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ready {
    pub card_type: CardType,
    pub bus_width: BusWidth,
    pub frequency_khz: u32,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: SdPath,
    pub size: u64,
    pub is_directory: bool,
}

/// A pin that isn't there, for boards where the card is always powered.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoPowerPin;

impl OutputPin for NoPowerPin {
    type Error = core::convert::Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// The mount lifecycle of a card behind some host driver.
pub struct CardSession<H>
where
    H: SdMmcHost,
{
    host: H,
    opts: MountOpts,
    state: MountState,
    failure: Option<MountError>,
    bus: Option<BusConfiguration>,
    ready: Option<Ready>,
    capacity_bytes: Option<u64>,
    fs_type: FsType,
    usage: Option<Usage>,
}

impl<H> CardSession<H>
where
    H: SdMmcHost,
{
    pub fn new(host: H, opts: MountOpts) -> Self {
        CardSession {
            host,
            opts,
            state: MountState::Unmounted,
            failure: None,
            bus: None,
            ready: None,
            capacity_bytes: None,
            fs_type: FsType::Unknown,
            usage: None,
        }
    }

    /// Power the card, negotiate the bus and mount the filesystem.
    ///
    /// Does nothing if the card is already mounted. Once failed, keeps
    /// returning the same error.
    pub fn initialize<P>(
        &mut self,
        bus: &BusConfiguration,
        power: Option<&mut P>,
    ) -> Result<Ready, MountError>
    where
        P: OutputPin,
    {
        match (self.state, self.ready) {
            (MountState::Mounted, Some(ready)) => return Ok(ready),
            (MountState::Failed, _) => return Err(self.failure.unwrap_or(MountError::CardLost)),
            _ => {}
        }

        self.state = MountState::Mounting;
        if let Some(pin) = power {
            debug!("Powering card");
            if pin.set_high().is_err() {
                return Err(self.fail(MountError::PowerControl));
            }
        }
        self.bus = Some(bus.clone());
        self.mount(bus)
    }

    fn mount(&mut self, bus: &BusConfiguration) -> Result<Ready, MountError> {
        self.state = MountState::Mounting;
        debug!("Mounting with opts: {:?}", self.opts);
        let info = match self.host.mount(bus, &self.opts) {
            Ok(info) => info,
            Err(e) => {
                error!("Mount failed: {:?}", e);
                return Err(self.fail(MountError::from_mount(e)));
            }
        };

        let ready = Ready {
            card_type: CardType::detect(info.kind, info.ocr, &info.csd),
            bus_width: info.bus_width,
            frequency_khz: info.max_freq_khz,
        };
        if ready.bus_width != bus.width() {
            warn!(
                "Card negotiated {}-bit bus, {}-bit configured",
                ready.bus_width.lines(),
                bus.width().lines()
            );
        }
        self.capacity_bytes = Csd::new(&info.csd).ok().map(|csd| csd.card_capacity_bytes());
        self.ready = Some(ready);
        self.state = MountState::Mounted;
        info!(
            "Mounted at {} ({}-bit, {} kHz, {})",
            self.opts.mount_point,
            ready.bus_width.lines(),
            ready.frequency_khz,
            ready.card_type.label()
        );

        // First figures; a failure here is reported by the next refresh.
        let _ = self.refresh();
        match self.state {
            MountState::Mounted => Ok(ready),
            _ => Err(self.failure.unwrap_or(MountError::CardLost)),
        }
    }

    fn fail(&mut self, err: MountError) -> MountError {
        self.state = MountState::Failed;
        self.failure = Some(err);
        self.ready = None;
        self.usage = None;
        err
    }

    fn lose_card(&mut self) {
        if self.state == MountState::Mounted {
            error!("Card lost while mounted at {}", self.opts.mount_point);
            self.fail(MountError::CardLost);
        }
    }

    /// Recompute usage with one filesystem stat.
    pub fn refresh(&mut self) -> Result<Usage, MountError> {
        if self.state != MountState::Mounted {
            return Err(MountError::NotMounted);
        }
        match self.host.fs_stat() {
            Ok(stat) => {
                let cluster_size = u64::from(stat.cluster_size);
                let total = u64::from(stat.total_clusters) * cluster_size;
                let free = (u64::from(stat.free_clusters) * cluster_size).min(total);
                let usage = Usage {
                    total,
                    used: total - free,
                    free,
                };
                self.fs_type = stat.fs_type;
                self.usage = Some(usage);
                Ok(usage)
            }
            Err(e) if e.is_card_lost() => {
                self.lose_card();
                Err(MountError::CardLost)
            }
            Err(e) => {
                warn!("Filesystem stat failed: {:?}", e);
                Err(MountError::Driver(e))
            }
        }
    }

    /// Unmount the card. The session can be initialized again afterwards.
    pub fn unmount(&mut self) -> Result<(), MountError> {
        if self.state != MountState::Mounted {
            warn!("Unmount requested but card is not mounted");
            return Err(MountError::NotMounted);
        }
        match self.host.unmount() {
            Ok(()) => {
                self.state = MountState::Unmounted;
                self.ready = None;
                self.usage = None;
                info!("Unmounted {}", self.opts.mount_point);
                Ok(())
            }
            Err(e) if e.is_card_lost() => {
                self.lose_card();
                Err(MountError::CardLost)
            }
            Err(e) => {
                error!("Unmount failed: {:?}", e);
                Err(MountError::Driver(e))
            }
        }
    }

    /// Unmount and mount again with the same bus configuration.
    pub fn remount(&mut self) -> Result<Ready, MountError> {
        let bus = self.bus.clone().ok_or(MountError::NotMounted)?;
        self.unmount()?;
        self.mount(&bus)
    }

    /// Wipe the card and mount the fresh filesystem.
    pub fn format(&mut self) -> Result<Ready, MountError> {
        let bus = self.bus.clone().ok_or(MountError::NotMounted)?;
        self.unmount()?;
        if let Err(e) = self.host.format(&self.opts) {
            error!("Failed to format card: {:?}", e);
            if e.is_card_lost() {
                return Err(self.fail(MountError::CardLost));
            }
            return Err(MountError::Driver(e));
        }
        warn!("Formatted card at {}; remounting", self.opts.mount_point);
        self.mount(&bus)
    }

    fn checked_path(&self, path: &str) -> Result<SdPath, IoError> {
        if self.state != MountState::Mounted {
            return Err(IoError::NotMounted);
        }
        SdPath::new(path).map_err(|_| IoError::PathInvalid)
    }

    /// Run `f` against the driver if mounted.
    ///
    /// Driver errors are translated for `op`; losing the card fails the
    /// session.
    fn with_mounted<F, R>(&mut self, op: Operation, f: F) -> Result<R, IoError>
    where
        F: FnOnce(&mut H) -> Result<R, DriverError>,
    {
        if self.state != MountState::Mounted {
            return Err(IoError::NotMounted);
        }
        let result = f(&mut self.host);
        result.map_err(|e| {
            if e.is_card_lost() {
                self.lose_card();
                if op.mutates() {
                    IoError::WriteFailed
                } else {
                    IoError::NotMounted
                }
            } else {
                op.io_error(e)
            }
        })
    }

    pub fn read(&mut self, path: &str) -> Result<Vec<u8>, IoError> {
        let path = self.checked_path(path)?;
        if path.is_root() {
            return Err(IoError::NotAFile);
        }
        self.with_mounted(Operation::Read, |host| host.read(&path))
    }

    /// Write `data`, creating the file if needed. Existing content is
    /// replaced unless `append` is set.
    pub fn write(&mut self, path: &str, data: &[u8], append: bool) -> Result<(), IoError> {
        let path = self.checked_path(path)?;
        if path.is_root() {
            return Err(IoError::PathInvalid);
        }
        let mode = if append {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        };
        let written = self.with_mounted(Operation::Write, |host| host.write(&path, data, mode))?;
        if written != data.len() {
            error!(
                "Short write to {}: {} of {} bytes",
                path.as_str(),
                written,
                data.len()
            );
            return Err(IoError::WriteFailed);
        }
        info!(
            "{} {} bytes to {}",
            if append { "Appended" } else { "Wrote" },
            written,
            path.as_str()
        );
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Result<(), IoError> {
        let path = self.checked_path(path)?;
        if path.is_root() {
            return Err(IoError::PathInvalid);
        }
        self.with_mounted(Operation::Remove, |host| host.remove_file(&path))?;
        info!("Deleted file {}", path.as_str());
        Ok(())
    }

    pub fn make_directory(&mut self, path: &str) -> Result<(), IoError> {
        let path = self.checked_path(path)?;
        if path.is_root() {
            return Err(IoError::AlreadyExists);
        }
        self.with_mounted(Operation::MakeDir, |host| host.create_dir(&path))?;
        info!("Created directory {}", path.as_str());
        Ok(())
    }

    /// Remove an empty directory.
    pub fn remove_directory(&mut self, path: &str) -> Result<(), IoError> {
        let path = self.checked_path(path)?;
        if path.is_root() {
            return Err(IoError::PathInvalid);
        }
        self.with_mounted(Operation::RemoveDir, |host| host.remove_dir(&path))?;
        info!("Removed directory {}", path.as_str());
        Ok(())
    }

    pub fn file_size(&mut self, path: &str) -> Result<u64, IoError> {
        let path = self.checked_path(path)?;
        let metadata = self.with_mounted(Operation::Stat, |host| host.stat(&path))?;
        if metadata.is_dir() {
            return Err(IoError::NotAFile);
        }
        Ok(metadata.size)
    }

    pub fn is_directory(&mut self, path: &str) -> bool {
        let path = match self.checked_path(path) {
            Ok(path) => path,
            Err(_) => return false,
        };
        self.with_mounted(Operation::Stat, |host| host.stat(&path))
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    /// List `path` and, up to `depth` levels deep, its subdirectories.
    /// A depth of 0 lists nothing.
    pub fn list_directory(&mut self, path: &str, depth: u8) -> Result<Vec<FileInfo>, IoError> {
        let path = self.checked_path(path)?;
        let mut out = Vec::new();
        self.scan_dir(&path, depth, &mut out)?;
        debug!(
            "Listed {} entries under {} (depth: {})",
            out.len(),
            path.as_str(),
            depth
        );
        Ok(out)
    }

    fn scan_dir(&mut self, dir: &SdPath, depth: u8, out: &mut Vec<FileInfo>) -> Result<(), IoError> {
        if depth == 0 {
            return Ok(());
        }
        let entries = self.with_mounted(Operation::List, |host| host.read_dir(dir))?;
        for entry in entries {
            let path = dir.join(&entry.name).map_err(|_| IoError::ReadFailed)?;
            let is_directory = entry.metadata.is_dir();
            out.push(FileInfo {
                path: path.clone(),
                size: entry.metadata.size,
                is_directory,
            });
            if is_directory && depth > 1 {
                self.scan_dir(&path, depth - 1, out)?;
            }
        }
        Ok(())
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    /// Why the session failed, if it did.
    pub fn failure(&self) -> Option<MountError> {
        self.failure
    }

    pub fn card_type(&self) -> CardType {
        self.ready.map(|r| r.card_type).unwrap_or(CardType::Unknown)
    }

    pub fn fs_type(&self) -> FsType {
        match self.state {
            MountState::Mounted => self.fs_type,
            _ => FsType::Unknown,
        }
    }

    /// Bus clock in kHz, 0 when not mounted.
    pub fn frequency_khz(&self) -> u32 {
        self.ready.map(|r| r.frequency_khz).unwrap_or(0)
    }

    pub fn bus_width(&self) -> Option<BusWidth> {
        self.ready.map(|r| r.bus_width)
    }

    /// Raw card capacity from the CSD register, filesystem overhead included.
    pub fn card_capacity_bytes(&self) -> Option<u64> {
        if self.is_mounted() {
            self.capacity_bytes
        } else {
            None
        }
    }

    /// The figures from the last successful refresh.
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn opts(&self) -> &MountOpts {
        &self.opts
    }

    /// Get at the driver, e.g. for vendor specific calls.
    pub fn host(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H> Drop for CardSession<H>
where
    H: SdMmcHost,
{
    fn drop(&mut self) {
        if self.state == MountState::Mounted {
            let _ = self.host.unmount();
        }
    }
}

#[cfg(test)]
mod test;

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
