use alloc::vec::Vec;
use core::cell::RefCell;

use crate::bus::BusConfiguration;
use crate::path::SdPath;

use super::{CardInfo, DirEntry, DriverError, FsStat, Metadata, MountOpts, SdMmcHost, WriteMode};

impl<T> SdMmcHost for RefCell<T>
where
    T: SdMmcHost,
{
    fn mount(&mut self, bus: &BusConfiguration, opts: &MountOpts) -> Result<CardInfo, DriverError> {
        self.get_mut().mount(bus, opts)
    }

    fn unmount(&mut self) -> Result<(), DriverError> {
        self.get_mut().unmount()
    }

    fn format(&mut self, opts: &MountOpts) -> Result<(), DriverError> {
        self.get_mut().format(opts)
    }

    fn fs_stat(&mut self) -> Result<FsStat, DriverError> {
        self.get_mut().fs_stat()
    }

    fn stat(&mut self, path: &SdPath) -> Result<Metadata, DriverError> {
        self.get_mut().stat(path)
    }

    fn read(&mut self, path: &SdPath) -> Result<Vec<u8>, DriverError> {
        self.get_mut().read(path)
    }

    fn write(
        &mut self,
        path: &SdPath,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize, DriverError> {
        self.get_mut().write(path, data, mode)
    }

    fn remove_file(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.get_mut().remove_file(path)
    }

    fn create_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.get_mut().create_dir(path)
    }

    fn remove_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.get_mut().remove_dir(path)
    }

    fn read_dir(&mut self, path: &SdPath) -> Result<Vec<DirEntry>, DriverError> {
        self.get_mut().read_dir(path)
    }
}

/// Lets a test keep hold of the card (to eject it, inspect it) while the
/// session drives it.
impl<T> SdMmcHost for &RefCell<T>
where
    T: SdMmcHost,
{
    fn mount(&mut self, bus: &BusConfiguration, opts: &MountOpts) -> Result<CardInfo, DriverError> {
        self.borrow_mut().mount(bus, opts)
    }

    fn unmount(&mut self) -> Result<(), DriverError> {
        self.borrow_mut().unmount()
    }

    fn format(&mut self, opts: &MountOpts) -> Result<(), DriverError> {
        self.borrow_mut().format(opts)
    }

    fn fs_stat(&mut self) -> Result<FsStat, DriverError> {
        self.borrow_mut().fs_stat()
    }

    fn stat(&mut self, path: &SdPath) -> Result<Metadata, DriverError> {
        self.borrow_mut().stat(path)
    }

    fn read(&mut self, path: &SdPath) -> Result<Vec<u8>, DriverError> {
        self.borrow_mut().read(path)
    }

    fn write(
        &mut self,
        path: &SdPath,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize, DriverError> {
        self.borrow_mut().write(path, data, mode)
    }

    fn remove_file(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.borrow_mut().remove_file(path)
    }

    fn create_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.borrow_mut().create_dir(path)
    }

    fn remove_dir(&mut self, path: &SdPath) -> Result<(), DriverError> {
        self.borrow_mut().remove_dir(path)
    }

    fn read_dir(&mut self, path: &SdPath) -> Result<Vec<DirEntry>, DriverError> {
        self.borrow_mut().read_dir(path)
    }
}
