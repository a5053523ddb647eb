use crate::address::Address;

/// First unlock cycle address
pub const UNLOCK_ADDRESS_1: u16 = 0x5555;
/// Second unlock cycle address
pub const UNLOCK_ADDRESS_2: u16 = 0x2AAA;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Unlock1 = 0xAA,
    Unlock2 = 0x55,
    ByteProgram = 0xA0,
    EraseSetup = 0x80,
    ChipErase = 0x10,
    SoftwareIdEntry = 0x90,
    SoftwareIdExit = 0xF0,
}

/// One bus write cycle of a command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub address: u16,
    pub data: u8,
}

const fn cycle(address: u16, command: Command) -> Cycle {
    Cycle {
        address,
        data: command as u8,
    }
}

const UNLOCK_1: Cycle = cycle(UNLOCK_ADDRESS_1, Command::Unlock1);
const UNLOCK_2: Cycle = cycle(UNLOCK_ADDRESS_2, Command::Unlock2);

/// An ordered list of cycles that must be written back to back, with no mode
/// change in between. Replayed as is, never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSequence(&'static [Cycle]);

impl CommandSequence {
    /// Prefix of every byte-program cycle
    pub const BYTE_PROGRAM: CommandSequence = CommandSequence(&[
        UNLOCK_1,
        UNLOCK_2,
        cycle(UNLOCK_ADDRESS_1, Command::ByteProgram),
    ]);

    pub const CHIP_ERASE: CommandSequence = CommandSequence(&[
        UNLOCK_1,
        UNLOCK_2,
        cycle(UNLOCK_ADDRESS_1, Command::EraseSetup),
        UNLOCK_1,
        UNLOCK_2,
        cycle(UNLOCK_ADDRESS_1, Command::ChipErase),
    ]);

    pub const SOFTWARE_ID_ENTRY: CommandSequence = CommandSequence(&[
        UNLOCK_1,
        UNLOCK_2,
        cycle(UNLOCK_ADDRESS_1, Command::SoftwareIdEntry),
    ]);

    pub const SOFTWARE_ID_EXIT: CommandSequence = CommandSequence(&[
        UNLOCK_1,
        UNLOCK_2,
        cycle(UNLOCK_ADDRESS_1, Command::SoftwareIdExit),
    ]);

    pub fn cycles(&self) -> impl Iterator<Item = (Address, u8)> + 'static {
        self.0.iter().map(|c| (Address::from(c.address), c.data))
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
