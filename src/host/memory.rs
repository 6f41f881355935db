//! An SD card simulated in RAM.
//!
//! Clones share the same card, so a test can keep one handle to eject the
//! card or look at its contents while the session drives the other.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::bus::{BusConfiguration, BusWidth};
use crate::csd::CardKind;
use crate::fs_type::FsType;
use crate::path::SdPath;

use super::{
    Attributes, CardInfo, DirEntry, DriverError, FsStat, Metadata, MountOpts, SdMmcHost,
    WriteMode,
};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug)]
struct State {
    info: CardInfo,
    fs_type: FsType,
    cluster_size: u32,
    total_clusters: u32,
    present: bool,
    formatted: bool,
    mounted: bool,
    /// Lines we can actually use, for card slots wired 1-bit only.
    max_width: BusWidth,
    mount_count: u32,
    /// Card sits behind a power switch and only answers while `powered`.
    switched: bool,
    powered: bool,
    // Root is implicit.
    nodes: BTreeMap<SdPath, Node>,
}

#[derive(Debug, Clone)]
pub struct MemoryCard {
    state: Rc<RefCell<State>>,
}

impl MemoryCard {
    /// An 8 GB SDHC card as it comes out of the packet.
    pub const SDHC_INFO: CardInfo = CardInfo {
        kind: CardKind::Sd,
        ocr: 0xC0FF_8000,
        csd: [
            0x40, 0x0E, 0x00, 0x32, 0x5B, 0x59, 0x00, 0x00, 0x3B, 0x37, 0x7F, 0x80, 0x0A, 0x40,
            0x40, 0x00,
        ],
        max_freq_khz: 40_000,
        bus_width: BusWidth::FourBit,
    };

    /// A FAT32 formatted card with `capacity_bytes` of data area and 4 KiB clusters.
    pub fn new(capacity_bytes: u64) -> MemoryCard {
        Self::with_info(Self::SDHC_INFO, FsType::Fat32, capacity_bytes, 4096)
    }

    /// A `cluster_size` of 0 is taken as 1.
    pub fn with_info(
        info: CardInfo,
        fs_type: FsType,
        capacity_bytes: u64,
        cluster_size: u32,
    ) -> MemoryCard {
        let cluster_size = cluster_size.max(1);
        let total_clusters = (capacity_bytes / u64::from(cluster_size)) as u32;
        MemoryCard {
            state: Rc::new(RefCell::new(State {
                info,
                fs_type,
                cluster_size,
                total_clusters,
                present: true,
                formatted: true,
                mounted: false,
                max_width: BusWidth::FourBit,
                mount_count: 0,
                switched: false,
                powered: false,
                nodes: BTreeMap::new(),
            })),
        }
    }

    /// A card without any filesystem on it.
    pub fn unformatted(self) -> Self {
        self.state.borrow_mut().formatted = false;
        self
    }

    /// A slot where only DATA0 is wired up.
    pub fn one_bit_slot(self) -> Self {
        self.state.borrow_mut().max_width = BusWidth::OneBit;
        self
    }

    /// A card that stays dark until `set_powered(true)`.
    pub fn behind_power_switch(self) -> Self {
        self.state.borrow_mut().switched = true;
        self
    }

    /// Pull the card out of the slot.
    pub fn eject(&self) {
        let mut state = self.state.borrow_mut();
        state.present = false;
        state.mounted = false;
    }

    /// Put the card back. It has to be mounted again.
    pub fn insert(&self) {
        self.state.borrow_mut().present = true;
    }

    pub fn is_mounted(&self) -> bool {
        self.state.borrow().mounted
    }

    /// How many times the card was mounted.
    pub fn mount_count(&self) -> u32 {
        self.state.borrow().mount_count
    }

    /// Whether the power switch is on.
    pub fn powered(&self) -> bool {
        self.state.borrow().powered
    }

    /// Called by whatever drives the power switch in tests.
    pub fn set_powered(&self, powered: bool) {
        self.state.borrow_mut().powered = powered;
    }

    /// Contents of a file, bypassing the mount state.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let path = SdPath::new(path).ok()?;
        match self.state.borrow().nodes.get(&path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        match SdPath::new(path) {
            Ok(path) => path.is_root() || self.state.borrow().nodes.contains_key(&path),
            Err(_) => false,
        }
    }
}

impl State {
    fn check_mounted(&self) -> Result<(), DriverError> {
        if !self.present {
            Err(DriverError::CardRemoved)
        } else if !self.mounted {
            Err(DriverError::Other(-1))
        } else {
            Ok(())
        }
    }

    fn clusters_for(&self, len: usize) -> u32 {
        let cluster_size = self.cluster_size as usize;
        ((len + cluster_size - 1) / cluster_size) as u32
    }

    fn used_clusters(&self) -> u32 {
        self.nodes
            .values()
            .map(|node| match node {
                Node::File(data) => self.clusters_for(data.len()),
                Node::Dir => 1,
            })
            .sum()
    }

    fn is_dir(&self, path: &SdPath) -> bool {
        path.is_root() || self.nodes.get(path) == Some(&Node::Dir)
    }

    fn wipe(&mut self, cluster_size: u32) {
        let capacity = u64::from(self.total_clusters) * u64::from(self.cluster_size);
        let cluster_size = cluster_size.max(1);
        self.cluster_size = cluster_size;
        self.total_clusters = (capacity / u64::from(cluster_size)) as u32;
        self.nodes.clear();
        self.formatted = true;
    }

    fn parent_is_dir(&self, path: &SdPath) -> Result<(), DriverError> {
        let parent = path.parent().ok_or(DriverError::InvalidName)?;
        if self.is_dir(&parent) {
            Ok(())
        } else if self.nodes.contains_key(&parent) {
            Err(DriverError::NotADirectory)
        } else {
            Err(DriverError::NotFound)
        }
    }
}

impl SdMmcHost for MemoryCard {
    fn mount(&mut self, bus: &BusConfiguration, opts: &MountOpts) -> Result<CardInfo, DriverError> {
        let mut state = self.state.borrow_mut();
        if !state.present || (state.switched && !state.powered) {
            return Err(DriverError::NoCard);
        }
        if !state.formatted {
            if !opts.format_if_mount_failed {
                return Err(DriverError::NoFilesystem);
            }
            state.wipe(opts.allocation_unit_size);
        }
        state.mounted = true;
        state.mount_count += 1;

        let mut info = state.info;
        info.bus_width = match (bus.width(), state.max_width) {
            (BusWidth::FourBit, BusWidth::FourBit) => BusWidth::FourBit,
            _ => BusWidth::OneBit,
        };
        Ok(info)
    }

    fn unmount(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if !state.present {
            return Err(DriverError::CardRemoved);
        }
        if !state.mounted {
            return Err(DriverError::Other(-1));
        }
        state.mounted = false;
        Ok(())
    }

    fn format(&mut self, opts: &MountOpts) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if !state.present {
            return Err(DriverError::NoCard);
        }
        state.wipe(opts.allocation_unit_size);
        Ok(())
    }

    fn fs_stat(&mut self) -> Result<FsStat, DriverError> {
        let state = self.state.borrow();
        state.check_mounted()?;
        Ok(FsStat {
            fs_type: state.fs_type,
            cluster_size: state.cluster_size,
            total_clusters: state.total_clusters,
            free_clusters: state.total_clusters.saturating_sub(state.used_clusters()),
        })
    }

    fn stat(&mut self, path: &SdPath) -> Result<Metadata, DriverError> {
        let state = self.state.borrow();
        state.check_mounted()?;
        if path.is_root() {
            return Ok(Metadata {
                size: 0,
                attributes: Attributes::DIRECTORY,
            });
        }
        match state.nodes.get(path) {
            Some(Node::File(data)) => Ok(Metadata {
                size: data.len() as u64,
                attributes: Attributes::ARCHIVE,
            }),
            Some(Node::Dir) => Ok(Metadata {
                size: 0,
                attributes: Attributes::DIRECTORY,
            }),
            None => Err(DriverError::NotFound),
        }
    }

    fn read(&mut self, path: &SdPath) -> Result<Vec<u8>, DriverError> {
        let state = self.state.borrow();
        state.check_mounted()?;
        if path.is_root() {
            return Err(DriverError::IsADirectory);
        }
        match state.nodes.get(path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(DriverError::IsADirectory),
            None => Err(DriverError::NotFound),
        }
    }

    fn write(
        &mut self,
        path: &SdPath,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize, DriverError> {
        let mut state = self.state.borrow_mut();
        state.check_mounted()?;
        state.parent_is_dir(path)?;

        let old = match state.nodes.get(path) {
            Some(Node::Dir) => return Err(DriverError::IsADirectory),
            Some(Node::File(old)) => old.clone(),
            None => Vec::new(),
        };
        let mut new = match mode {
            WriteMode::Truncate => Vec::new(),
            WriteMode::Append => old.clone(),
        };
        new.extend_from_slice(data);

        let growth = state
            .clusters_for(new.len())
            .saturating_sub(state.clusters_for(old.len()));
        let free = state.total_clusters.saturating_sub(state.used_clusters());
        if growth > free {
            return Err(DriverError::NoSpace);
        }

        state.nodes.insert(path.clone(), Node::File(new));
        Ok(data.len())
    }

    fn remove_file(&mut self, path: &SdPath) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.check_mounted()?;
        if path.is_root() || state.is_dir(path) {
            return Err(DriverError::IsADirectory);
        }
        state
            .nodes
            .remove(path)
            .map(|_| ())
            .ok_or(DriverError::NotFound)
    }

    fn create_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.check_mounted()?;
        if path.is_root() || state.nodes.contains_key(path) {
            return Err(DriverError::AlreadyExists);
        }
        state.parent_is_dir(path)?;
        if state.used_clusters() >= state.total_clusters {
            return Err(DriverError::NoSpace);
        }
        state.nodes.insert(path.clone(), Node::Dir);
        Ok(())
    }

    fn remove_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.check_mounted()?;
        if path.is_root() {
            return Err(DriverError::InvalidName);
        }
        match state.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(DriverError::NotADirectory),
            None => return Err(DriverError::NotFound),
        }
        if state.nodes.keys().any(|p| p.is_child_of(path)) {
            return Err(DriverError::NotEmpty);
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn read_dir(&mut self, path: &SdPath) -> Result<Vec<DirEntry>, DriverError> {
        let state = self.state.borrow();
        state.check_mounted()?;
        if !state.is_dir(path) {
            return if state.nodes.contains_key(path) {
                Err(DriverError::NotADirectory)
            } else {
                Err(DriverError::NotFound)
            };
        }
        let entries = state
            .nodes
            .iter()
            .filter(|(p, _)| p.is_child_of(path))
            .map(|(p, node)| DirEntry {
                name: String::from(p.file_name().unwrap_or_default()),
                metadata: match node {
                    Node::File(data) => Metadata {
                        size: data.len() as u64,
                        attributes: Attributes::ARCHIVE,
                    },
                    Node::Dir => Metadata {
                        size: 0,
                        attributes: Attributes::DIRECTORY,
                    },
                },
            })
            .collect();
        Ok(entries)
    }
}
