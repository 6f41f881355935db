//! sd-mmc-card - Bus Configuration
//!
//! Pin assignment and bus width for the SD/MMC host peripheral.

use crate::config::{ConfigError, DataLine, PinRole};

/// The width of the SD/MMC data bus.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusWidth {
    /// Only DATA0 is used.
    OneBit,
    /// DATA0 to DATA3 are used.
    FourBit,
}

impl BusWidth {
    /// Number of data lines.
    pub fn lines(self) -> u8 {
        match self {
            BusWidth::OneBit => 1,
            BusWidth::FourBit => 4,
        }
    }
}

/// Describes which GPIOs a chip has and what they can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioCaps {
    /// Highest GPIO number.
    pub max_pin: u8,
    /// GPIO numbers inside `0..=max_pin` that are not bonded out.
    pub absent: &'static [u8],
    /// GPIOs that can only be used as inputs.
    pub input_only: &'static [u8],
}

impl GpioCaps {
    /// The original ESP32. GPIO34-39 are input only.
    pub const ESP32: GpioCaps = GpioCaps {
        max_pin: 39,
        absent: &[20, 24, 28, 29, 30, 31],
        input_only: &[34, 35, 36, 37, 38, 39],
    };

    /// The ESP32-S3.
    pub const ESP32_S3: GpioCaps = GpioCaps {
        max_pin: 48,
        absent: &[22, 23, 24, 25],
        input_only: &[],
    };

    /// Does this GPIO exist at all?
    pub fn exists(&self, pin: u8) -> bool {
        pin <= self.max_pin && !self.absent.contains(&pin)
    }

    /// Can this GPIO drive its line?
    pub fn is_output_capable(&self, pin: u8) -> bool {
        self.exists(pin) && !self.input_only.contains(&pin)
    }
}

/// A validated pin assignment. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfiguration {
    clk: u8,
    cmd: u8,
    data: [u8; 4],
    width: BusWidth,
    power_ctrl: Option<u8>,
}

impl BusConfiguration {
    /// Validate a pin assignment.
    ///
    /// In 1-bit mode `data1`..`data3` are ignored, whatever they contain. In
    /// 4-bit mode all three must be given. Every pin in use must exist on the
    /// platform and be able to drive its line, and no GPIO may be used twice.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        caps: &GpioCaps,
        clk: u8,
        cmd: u8,
        data0: u8,
        data1: Option<u8>,
        data2: Option<u8>,
        data3: Option<u8>,
        mode_1bit: bool,
        power_ctrl: Option<u8>,
    ) -> Result<BusConfiguration, ConfigError> {
        let (width, data) = if mode_1bit {
            (BusWidth::OneBit, [data0, 0, 0, 0])
        } else {
            let d1 = data1.ok_or(ConfigError::MissingDataPin(DataLine::D1))?;
            let d2 = data2.ok_or(ConfigError::MissingDataPin(DataLine::D2))?;
            let d3 = data3.ok_or(ConfigError::MissingDataPin(DataLine::D3))?;
            (BusWidth::FourBit, [data0, d1, d2, d3])
        };

        let bus = BusConfiguration {
            clk,
            cmd,
            data,
            width,
            power_ctrl,
        };

        let mut seen: [Option<(u8, PinRole)>; 7] = [None; 7];
        for (idx, (role, pin)) in bus.pins().enumerate() {
            if !caps.is_output_capable(pin) {
                return Err(ConfigError::InvalidPin { role, pin });
            }
            if let Some((_, first)) = seen.iter().flatten().find(|(p, _)| *p == pin) {
                return Err(ConfigError::DuplicatePin {
                    pin,
                    first: *first,
                    second: role,
                });
            }
            seen[idx] = Some((pin, role));
        }

        Ok(bus)
    }

    /// Iterate over every pin in use, with its role.
    pub fn pins(&self) -> impl Iterator<Item = (PinRole, u8)> + '_ {
        static DATA_ROLES: [PinRole; 4] = [
            PinRole::Data0,
            PinRole::Data1,
            PinRole::Data2,
            PinRole::Data3,
        ];
        let data = DATA_ROLES.iter().copied().zip(self.data_pins().iter().copied());
        core::iter::once((PinRole::Clk, self.clk))
            .chain(core::iter::once((PinRole::Cmd, self.cmd)))
            .chain(data)
            .chain(self.power_ctrl.map(|pin| (PinRole::PowerCtrl, pin)))
    }

    pub fn clk(&self) -> u8 {
        self.clk
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    /// The data lines actually in use: one in 1-bit mode, four in 4-bit mode.
    pub fn data_pins(&self) -> &[u8] {
        &self.data[..self.width.lines() as usize]
    }

    pub fn width(&self) -> BusWidth {
        self.width
    }

    pub fn power_ctrl_pin(&self) -> Option<u8> {
        self.power_ctrl
    }
}
