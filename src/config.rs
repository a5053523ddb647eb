/// Fixed waits inserted between signal transitions.
///
/// None of these are measured or adapted at runtime. The defaults are the
/// conservative values known to work with a 74HC595 chain and TXS0108E level
/// shifters in front of an SST39SF040; `settle_ns` in particular depends on the
/// wiring and should be calibrated per board.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// After every ordinary level change (shift clock, shift data, latch, control lines)
    pub settle_ns: u32,
    /// After a data line changes direction, the line is undefined for a while
    pub direction_settle_us: u32,
    /// WE# low pulse width, also the hold after WE# goes back high
    pub write_pulse_ns: u32,
    /// Byte-program completion, datasheet max is 20us
    pub program_us: u32,
    /// Chip-erase completion, datasheet max is 100ms
    pub erase_ms: u32,
}

impl Timing {
    pub const DEFAULT: Timing = Timing {
        settle_ns: 1_000,
        direction_settle_us: 1_000,
        write_pulse_ns: 1_000,
        program_us: 25,
        erase_ms: 1_000,
    };

    /// Datasheet limits with no margin. Only useful against a simulated chip
    /// or a board that has been characterised.
    pub const DATASHEET: Timing = Timing {
        settle_ns: 100,
        direction_settle_us: 1,
        write_pulse_ns: 40,
        program_us: 20,
        erase_ms: 100,
    };
}

impl Default for Timing {
    fn default() -> Self {
        Self::DEFAULT
    }
}
