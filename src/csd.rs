//! sd-mmc-card - Card identification
//!
//! Decodes the Card Specific Data register and the OCR bits the host driver
//! hands back after the handshake.

/// Card Capacity Status: set by SDHC and SDXC cards once powered up.
pub const OCR_CCS: u32 = 1 << 30;

/// Largest `C_SIZE` an SDHC card reports (32 GiB). Bigger means SDXC.
const SDHC_MAX_C_SIZE: u32 = 0xFF5F;

/// What protocol family answered the handshake.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardKind {
    Sd,
    Mmc,
}

/// The detected card type.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardType {
    Mmc,
    /// Standard capacity, byte addressed
    Sdsc,
    /// High capacity, block addressed
    Sdhc,
    /// Extended capacity
    Sdxc,
    Unknown,
}

impl CardType {
    /// Work out the card type from the handshake results.
    pub fn detect(kind: CardKind, ocr: u32, csd: &[u8; 16]) -> CardType {
        if kind == CardKind::Mmc {
            return CardType::Mmc;
        }
        if ocr & OCR_CCS == 0 {
            return CardType::Sdsc;
        }
        match Csd::new(csd) {
            Ok(Csd::V2(csd)) if csd.device_size() > SDHC_MAX_C_SIZE => CardType::Sdxc,
            Ok(Csd::V2(_)) => CardType::Sdhc,
            // CCS set but a version 1 CSD: the card is lying to us.
            Ok(Csd::V1(_)) | Err(_) => CardType::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CardType::Mmc => "MMC",
            CardType::Sdsc => "SDSC",
            CardType::Sdhc => "SDHC",
            CardType::Sdxc => "SDXC",
            CardType::Unknown => "UNKNOWN",
        }
    }
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CsdError {
    /// CSD_STRUCTURE we don't understand.
    UnknownStructure(u8),
}

/// The Card Specific Data register, either version.
#[derive(Debug, Clone, PartialEq)]
pub enum Csd {
    V1(CsdV1),
    V2(CsdV2),
}

impl Csd {
    pub fn new(data: &[u8; 16]) -> Result<Csd, CsdError> {
        match data[0] >> 6 {
            0 => Ok(Csd::V1(CsdV1 { data: *data })),
            1 => Ok(Csd::V2(CsdV2 { data: *data })),
            other => Err(CsdError::UnknownStructure(other)),
        }
    }

    pub fn card_capacity_bytes(&self) -> u64 {
        match self {
            Csd::V1(contents) => contents.card_capacity_bytes(),
            Csd::V2(contents) => contents.card_capacity_bytes(),
        }
    }
}

/// Version 1 CSD, used by SDSC and MMC cards.
#[derive(Debug, Clone, PartialEq)]
pub struct CsdV1 {
    data: [u8; 16],
}

impl CsdV1 {
    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(device_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]);
    define_field!(device_size_multiplier, u8, [(9, 0, 2), (10, 7, 1)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        let multiplier = self.device_size_multiplier() + self.read_block_length() + 2;
        (u64::from(self.device_size()) + 1) << multiplier
    }
}

/// Version 2 CSD, used by SDHC and SDXC cards.
#[derive(Debug, Clone, PartialEq)]
pub struct CsdV2 {
    data: [u8; 16],
}

impl CsdV2 {
    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(device_size, u32, [(7, 0, 6), (8, 0, 8), (9, 0, 8)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        (u64::from(self.device_size()) + 1) * 512 * 1024
    }
}
