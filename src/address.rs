use bit::BitIndex;

/// Number of outputs on the cascaded 74HC595 chain (three 8-bit registers).
pub const SHIFT_REGISTER_BITS: u32 = 24;

/// Address space of the SST39SF010A, 17 address lines
pub const SST39SF010A_SIZE: u32 = 0x2_0000;

/// Address space of the SST39SF020A, 18 address lines
pub const SST39SF020A_SIZE: u32 = 0x4_0000;

/// Address space of the SST39SF040, 19 address lines
pub const SST39SF040_SIZE: u32 = 0x8_0000;

/// An address on the memory chip
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u32);

impl Address {
    /// The bits that end up on the shift-register outputs. Anything above
    /// [`SHIFT_REGISTER_BITS`] is dropped.
    pub const fn masked(self) -> u32 {
        self.0 & ((1 << SHIFT_REGISTER_BITS) - 1)
    }

    /// The bit for each shift-register stage, in the order it is clocked in:
    /// least significant first, so the first bit ends up on the far end of the chain.
    pub fn serial_bits(self) -> impl Iterator<Item = bool> {
        let value = self.masked();
        (0..SHIFT_REGISTER_BITS as usize).map(move |i| value.bit(i))
    }
}

impl From<u32> for Address {
    fn from(addr: u32) -> Address {
        Address(addr)
    }
}

impl From<u16> for Address {
    fn from(addr: u16) -> Address {
        Address(addr as u32)
    }
}

impl From<Address> for u32 {
    fn from(addr: Address) -> u32 {
        addr.0
    }
}
