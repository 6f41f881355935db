//! sd-mmc-card - Filesystem type detection

use core::num::NonZeroU8;

/// The filesystem found on the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsType {
    Fat12,
    Fat16,
    Fat32,
    ExFat,
    Unknown,
}

impl FsType {
    pub fn label(self) -> &'static str {
        match self {
            FsType::Fat12 => "FAT12",
            FsType::Fat16 => "FAT16",
            FsType::Fat32 => "FAT32",
            FsType::ExFat => "exFAT",
            FsType::Unknown => "UNKNOWN",
        }
    }

    /// FAT flavour is decided by cluster count alone.
    pub fn from_cluster_count(cluster_count: u32) -> FsType {
        if cluster_count < 4085 {
            FsType::Fat12
        } else if cluster_count < 65525 {
            FsType::Fat16
        } else {
            FsType::Fat32
        }
    }
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootSectorError {
    TooShort,
    InvalidSignature([u8; 2]),
    InvalidBytesPerSector(u16),
    InvalidSectorsPerCluster(u8),
    BothSectorCountsZero,
    /// Reserved + FAT + root directory regions don't fit the volume.
    Inconsistent,
}

/// A view over the first sector of a volume.
///
/// Drivers that only get the raw boot sector from the vendor stack can use
/// this to work out the filesystem type and geometry.
#[derive(Debug, Clone, Copy)]
pub struct BootSector<'a> {
    data: &'a [u8],
}

impl<'a> BootSector<'a> {
    pub const LEN: usize = 512;
    const SIGNATURE: [u8; 2] = [0x55, 0xAA];
    const EXFAT_OEM_NAME: &'static [u8; 8] = b"EXFAT   ";

    pub fn new(data: &'a [u8]) -> Result<Self, BootSectorError> {
        if data.len() < Self::LEN {
            return Err(BootSectorError::TooShort);
        }
        let me = BootSector { data };
        let signature = [data[510], data[511]];
        if signature != Self::SIGNATURE {
            return Err(BootSectorError::InvalidSignature(signature));
        }
        Ok(me)
    }

    fn data(&self) -> &[u8] {
        self.data
    }

    define_field!(bytes_per_sec, u16, 11);
    define_field!(sec_per_clu, u8, 13);
    define_field!(rsvd_sec_cnt, u16, 14);
    define_field!(num_fats, u8, 16);
    define_field!(root_entr_cnt, u16, 17);
    define_field!(tot_sec_16, u16, 19);
    define_field!(fat_sz_16, u16, 22);
    define_field!(tot_sec_32, u32, 32);
    define_field!(fat_sz_32, u32, 36);

    pub fn is_exfat(&self) -> bool {
        &self.data[3..11] == &Self::EXFAT_OEM_NAME[..]
    }

    pub fn bytes_per_sector(&self) -> Result<u16, BootSectorError> {
        match self.bytes_per_sec() {
            512 | 1024 | 2048 | 4096 => Ok(self.bytes_per_sec()),
            other => Err(BootSectorError::InvalidBytesPerSector(other)),
        }
    }

    pub fn sectors_per_cluster(&self) -> Result<NonZeroU8, BootSectorError> {
        match self.sec_per_clu() {
            1 | 2 | 4 | 8 | 16 | 32 | 64 | 128 => NonZeroU8::new(self.sec_per_clu())
                .ok_or(BootSectorError::InvalidSectorsPerCluster(0)),
            other => Err(BootSectorError::InvalidSectorsPerCluster(other)),
        }
    }

    /// Bytes in one allocation unit.
    pub fn cluster_size(&self) -> Result<u32, BootSectorError> {
        Ok(u32::from(self.bytes_per_sector()?) * u32::from(self.sectors_per_cluster()?.get()))
    }

    /// Number of data clusters on the volume.
    pub fn cluster_count(&self) -> Result<u32, BootSectorError> {
        let bytes_per_sector = u32::from(self.bytes_per_sector()?);
        let sectors_per_cluster = u32::from(self.sectors_per_cluster()?.get());

        let total_sectors = match (self.tot_sec_16(), self.tot_sec_32()) {
            (0, 0) => return Err(BootSectorError::BothSectorCountsZero),
            (0, count) => count,
            (count, _) => u32::from(count),
        };
        let fat_size = match self.fat_sz_16() {
            0 => self.fat_sz_32(),
            size => u32::from(size),
        };
        let root_dir_sectors =
            (u32::from(self.root_entr_cnt()) * 32 + (bytes_per_sector - 1)) / bytes_per_sector;
        let data_sectors = u32::from(self.num_fats())
            .checked_mul(fat_size)
            .and_then(|fats| fats.checked_add(u32::from(self.rsvd_sec_cnt())))
            .and_then(|meta| meta.checked_add(root_dir_sectors))
            .and_then(|meta| total_sectors.checked_sub(meta))
            .ok_or(BootSectorError::Inconsistent)?;
        Ok(data_sectors / sectors_per_cluster)
    }

    pub fn fs_type(&self) -> FsType {
        if self.is_exfat() {
            return FsType::ExFat;
        }
        match self.cluster_count() {
            Ok(count) => FsType::from_cluster_count(count),
            Err(_) => FsType::Unknown,
        }
    }
}
