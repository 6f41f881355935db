//! sd-mmc-card - Host driver support
//!
//! The SD/MMC host controller, the card handshake and the FAT driver are
//! supplied by the vendor SDK. This module is the seam: anything that
//! implements [`SdMmcHost`] can back an [`SdMmcCard`](crate::SdMmcCard).

#[cfg(feature = "refcell-host")]
mod refcell;

mod memory;
pub use memory::MemoryCard;

use alloc::string::String;
use alloc::vec::Vec;

use crate::bus::{BusConfiguration, BusWidth};
use crate::csd::CardKind;
use crate::fs_type::FsType;
use crate::path::SdPath;

bitflags::bitflags! {
    /// FAT directory entry attributes.
    pub struct Attributes: u8 {
        const READ_ONLY = (1 << 0);
        const HIDDEN = (1 << 1);
        const SYSTEM = (1 << 2);
        const VOLUME_ID = (1 << 3);
        const DIRECTORY = (1 << 4);
        const ARCHIVE = (1 << 5);
    }
}

impl Attributes {
    pub fn is_dir(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }
}

/// Options for mounting the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct MountOpts {
    /// Where the vendor VFS attaches the FAT volume.
    pub mount_point: &'static str,
    /// Run mkfs when no filesystem is found. Destroys whatever is on the card.
    pub format_if_mount_failed: bool,
    /// Maximum number of files open at once.
    pub max_files: u8,
    /// Cluster size used when formatting.
    pub allocation_unit_size: u32,
}

impl Default for MountOpts {
    fn default() -> Self {
        MountOpts {
            mount_point: "/sdcard",
            format_if_mount_failed: false,
            max_files: 5,
            allocation_unit_size: 16 * 1024,
        }
    }
}

/// The possible errors a host driver can report.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// No card answered
    NoCard,
    /// We didn't get a response in time
    Timeout,
    /// The card went away while mounted
    CardRemoved,
    /// The card answered but holds no filesystem we can mount
    NoFilesystem,
    NotFound,
    IsADirectory,
    NotADirectory,
    AlreadyExists,
    NotEmpty,
    InvalidName,
    NoSpace,
    TooManyOpenFiles,
    /// Any other vendor error code
    Other(i32),
}

impl DriverError {
    /// Whether this error means the card can no longer be talked to.
    pub fn is_card_lost(&self) -> bool {
        matches!(self, DriverError::CardRemoved | DriverError::Timeout)
    }
}

/// What the handshake learned about the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub kind: CardKind,
    pub ocr: u32,
    pub csd: [u8; 16],
    pub max_freq_khz: u32,
    /// The width actually negotiated, may be narrower than configured.
    pub bus_width: BusWidth,
}

/// Filesystem level usage figures.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FsStat {
    pub fs_type: FsType,
    pub cluster_size: u32,
    pub total_clusters: u32,
    pub free_clusters: u32,
}

/// Information about a single file or directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub size: u64,
    pub attributes: Attributes,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.attributes.is_dir()
    }
}

/// One entry returned by [`SdMmcHost::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub metadata: Metadata,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or truncate, then write.
    Truncate,
    /// Create if needed, then write at the end.
    Append,
}

/// Represents an SD/MMC host controller plus the filesystem driver on top.
///
/// Every call may block for as long as the card needs, so none of these
/// may be called from interrupt context.
pub trait SdMmcHost {
    /// Run the card handshake with the given pins and mount the volume.
    fn mount(&mut self, bus: &BusConfiguration, opts: &MountOpts) -> Result<CardInfo, DriverError>;
    /// Unmount the volume and release the bus.
    fn unmount(&mut self) -> Result<(), DriverError>;
    /// Create a fresh filesystem. The card must be unmounted.
    fn format(&mut self, opts: &MountOpts) -> Result<(), DriverError>;
    fn fs_stat(&mut self) -> Result<FsStat, DriverError>;
    fn stat(&mut self, path: &SdPath) -> Result<Metadata, DriverError>;
    fn read(&mut self, path: &SdPath) -> Result<Vec<u8>, DriverError>;
    /// Returns the number of bytes written.
    fn write(&mut self, path: &SdPath, data: &[u8], mode: WriteMode)
        -> Result<usize, DriverError>;
    fn remove_file(&mut self, path: &SdPath) -> Result<(), DriverError>;
    fn create_dir(&mut self, path: &SdPath) -> Result<(), DriverError>;
    fn remove_dir(&mut self, path: &SdPath) -> Result<(), DriverError>;
    /// List one directory, without `.` and `..`.
    fn read_dir(&mut self, path: &SdPath) -> Result<Vec<DirEntry>, DriverError>;
}

impl<T> SdMmcHost for &mut T
where
    T: SdMmcHost,
{
    fn mount(&mut self, bus: &BusConfiguration, opts: &MountOpts) -> Result<CardInfo, DriverError> {
        (*self).mount(bus, opts)
    }

    fn unmount(&mut self) -> Result<(), DriverError> {
        (*self).unmount()
    }

    fn format(&mut self, opts: &MountOpts) -> Result<(), DriverError> {
        (*self).format(opts)
    }

    fn fs_stat(&mut self) -> Result<FsStat, DriverError> {
        (*self).fs_stat()
    }

    fn stat(&mut self, path: &SdPath) -> Result<Metadata, DriverError> {
        (*self).stat(path)
    }

    fn read(&mut self, path: &SdPath) -> Result<Vec<u8>, DriverError> {
        (*self).read(path)
    }

    fn write(
        &mut self,
        path: &SdPath,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize, DriverError> {
        (*self).write(path, data, mode)
    }

    fn remove_file(&mut self, path: &SdPath) -> Result<(), DriverError> {
        (*self).remove_file(path)
    }

    fn create_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        (*self).create_dir(path)
    }

    fn remove_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        (*self).remove_dir(path)
    }

    fn read_dir(&mut self, path: &SdPath) -> Result<Vec<DirEntry>, DriverError> {
        (*self).read_dir(path)
    }
}
