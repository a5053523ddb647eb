use crate::address::{SST39SF010A_SIZE, SST39SF020A_SIZE, SST39SF040_SIZE};

/// SST / Microchip JEDEC manufacturer code
pub const SST_MANUFACTURER_ID: u8 = 0xBF;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerId(pub u8);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u8);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Sst39sf010a,
    Sst39sf020a,
    Sst39sf040,
}

impl Chip {
    /// Size of the address space in bytes
    pub const fn size(self) -> u32 {
        match self {
            Chip::Sst39sf010a => SST39SF010A_SIZE,
            Chip::Sst39sf020a => SST39SF020A_SIZE,
            Chip::Sst39sf040 => SST39SF040_SIZE,
        }
    }
}

/// What the chip answers in software ID mode
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductId {
    pub manufacturer: ManufacturerId,
    pub device: DeviceId,
}

impl ProductId {
    /// The known part this ID belongs to, `None` for anything that isn't an SST39SF0x0
    pub fn chip(&self) -> Option<Chip> {
        if self.manufacturer.0 != SST_MANUFACTURER_ID {
            return None;
        }
        match self.device.0 {
            0xB5 => Some(Chip::Sst39sf010a),
            0xB6 => Some(Chip::Sst39sf020a),
            0xB7 => Some(Chip::Sst39sf040),
            _ => None,
        }
    }
}
