use crate::{
    address::{Address, SST39SF010A_SIZE, SST39SF020A_SIZE, SST39SF040_SIZE},
    bus::{BusMode, BusModeController, DataPin},
    command::CommandSequence,
    error::Error,
    id::{DeviceId, ManufacturerId, ProductId},
    shifter::AddressShifter,
    Pins, Timing,
};
use embedded_hal::{delay::DelayNs, digital::OutputPin};

/// Type alias for the SST39SF010A
pub type Sst39sf010a<P, D, DELAY> = Sst39sf<SST39SF010A_SIZE, P, D, DELAY>;

/// Type alias for the SST39SF020A
pub type Sst39sf020a<P, D, DELAY> = Sst39sf<SST39SF020A_SIZE, P, D, DELAY>;

/// Type alias for the SST39SF040
pub type Sst39sf040<P, D, DELAY> = Sst39sf<SST39SF040_SIZE, P, D, DELAY>;

/// The generic SST39SF driver. `SIZE` is the number of addressable bytes.
pub struct Sst39sf<const SIZE: u32, P, D, DELAY> {
    shifter: AddressShifter<P>,
    bus: BusModeController<P, D>,
    delay: DELAY,
    timing: Timing,
}

impl<const SIZE: u32, P, D, DELAY, E> Sst39sf<SIZE, P, D, DELAY>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
{
    pub const fn capacity() -> usize {
        SIZE as usize
    }

    /// Take the pins with the default [`Timing`] and leave the bus idle
    pub fn new(pins: Pins<P, D>, delay: DELAY) -> Result<Self, Error<E>> {
        Self::with_timing(pins, delay, Timing::default())
    }

    pub fn with_timing(pins: Pins<P, D>, delay: DELAY, timing: Timing) -> Result<Self, Error<E>> {
        let mut flash = Self {
            shifter: AddressShifter::new(pins.serial_data, pins.serial_clock, pins.latch),
            bus: BusModeController::new(
                pins.write_enable,
                pins.output_enable,
                pins.chip_enable,
                pins.data,
            ),
            delay,
            timing,
        };
        flash.enter_idle()?;
        Ok(flash)
    }

    /// Give the pins and the delay back. The bus is left in whatever mode it is in.
    pub fn release(self) -> (Pins<P, D>, DELAY) {
        let (serial_data, serial_clock, latch) = self.shifter.release();
        let (write_enable, output_enable, chip_enable, data) = self.bus.release();
        let pins = Pins {
            serial_data,
            serial_clock,
            latch,
            write_enable,
            output_enable,
            chip_enable,
            data,
        };
        (pins, self.delay)
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    pub fn mode(&self) -> BusMode {
        self.bus.mode()
    }

    pub fn verify_addr(addr: Address) -> Result<Address, Error<E>> {
        if addr.0 >= SIZE {
            return Err(Error::OutOfBounds);
        }
        Ok(addr)
    }

    pub fn enter_read(&mut self) -> Result<(), Error<E>> {
        self.bus.enter_read(&mut self.delay, &self.timing)
    }

    pub fn enter_write(&mut self) -> Result<(), Error<E>> {
        self.bus.enter_write(&mut self.delay, &self.timing)
    }

    pub fn enter_idle(&mut self) -> Result<(), Error<E>> {
        self.bus.enter_idle(&mut self.delay, &self.timing)
    }

    fn ensure_read(&mut self) -> Result<(), Error<E>> {
        if self.bus.mode() != BusMode::Read {
            self.enter_read()?;
        }
        Ok(())
    }

    fn ensure_write(&mut self) -> Result<(), Error<E>> {
        if self.bus.mode() != BusMode::Write {
            self.enter_write()?;
        }
        Ok(())
    }

    /// One bus write cycle. Address and data are stable before WE# falls and
    /// CE# is only released after WE# is back up; reordering this corrupts the
    /// program cycle. Returns after the program time has elapsed.
    fn write_cycle(&mut self, addr: Address, data: u8) -> Result<(), Error<E>> {
        let timing = self.timing;

        self.bus.open_cycle()?;
        self.delay.delay_ns(timing.settle_ns);

        self.shifter
            .shift_address(addr, &mut self.delay, timing.settle_ns)?;
        self.bus.set_data(data)?;
        self.delay.delay_ns(timing.settle_ns);

        self.bus.set_write_strobe(true)?;
        self.delay.delay_ns(timing.write_pulse_ns);
        self.bus.set_write_strobe(false)?;
        self.delay.delay_ns(timing.write_pulse_ns);

        self.bus.close_cycle()?;
        self.delay.delay_us(timing.program_us);
        Ok(())
    }

    /// Runs the whole sequence, there is no way to stop half way through
    /// without leaving the chip armed.
    fn replay(&mut self, sequence: CommandSequence) -> Result<(), Error<E>> {
        for (addr, data) in sequence.cycles() {
            self.write_cycle(addr, data)?;
        }
        Ok(())
    }

    /// Program one byte. The location must have been erased, programming can
    /// only clear bits.
    pub fn write_byte(&mut self, addr: Address, data: u8) -> Result<(), Error<E>> {
        let addr = Self::verify_addr(addr)?;
        self.ensure_write()?;
        self.replay(CommandSequence::BYTE_PROGRAM)?;
        self.write_cycle(addr, data)
    }

    /// Program consecutive bytes starting at `addr`
    pub fn write(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error<E>> {
        check_range::<SIZE, E>(addr, bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            self.write_byte(Address(addr.0 + i as u32), *byte)?;
        }
        Ok(())
    }

    /// Erase the whole chip to 0xFF. Blocks for [`Timing::erase_ms`], the chip
    /// is not polled so a failed erase only shows up when verifying.
    pub fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.ensure_write()?;
        log_trace!("chip erase");
        self.replay(CommandSequence::CHIP_ERASE)?;
        self.delay.delay_ms(self.timing.erase_ms);
        Ok(())
    }

    fn read_cycle(&mut self, addr: Address) -> Result<u8, Error<E>> {
        self.shifter
            .shift_address(addr, &mut self.delay, self.timing.settle_ns)?;
        self.delay.delay_ns(self.timing.settle_ns);
        self.bus.read_data()
    }

    /// Read one byte, switching the bus to read mode if needed
    pub fn read_byte(&mut self, addr: Address) -> Result<u8, Error<E>> {
        let addr = Self::verify_addr(addr)?;
        self.ensure_read()?;
        self.read_cycle(addr)
    }

    /// Read n bytes from an address
    pub fn read(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        check_range::<SIZE, E>(addr, buff.len())?;
        self.ensure_read()?;
        for (i, byte) in buff.iter_mut().enumerate() {
            *byte = self.read_cycle(Address(addr.0 + i as u32))?;
        }
        Ok(())
    }

    /// Read the manufacturer and device ID through the software ID mode
    pub fn read_product_id(&mut self) -> Result<ProductId, Error<E>> {
        self.ensure_write()?;
        self.replay(CommandSequence::SOFTWARE_ID_ENTRY)?;

        self.enter_read()?;
        let manufacturer = self.read_cycle(Address(0x0000))?;
        let device = self.read_cycle(Address(0x0001))?;

        self.enter_write()?;
        self.replay(CommandSequence::SOFTWARE_ID_EXIT)?;

        let id = ProductId {
            manufacturer: ManufacturerId(manufacturer),
            device: DeviceId(device),
        };
        log_debug!("product id {:#x} {:#x}", manufacturer, device);
        Ok(id)
    }
}

pub(crate) fn check_range<const SIZE: u32, E>(addr: Address, len: usize) -> Result<(), Error<E>> {
    let len = u32::try_from(len).map_err(|_| Error::OutOfBounds)?;
    match addr.0.checked_add(len) {
        Some(end) if end <= SIZE => Ok(()),
        _ => Err(Error::OutOfBounds),
    }
}

/// Implementation of the `NorFlash` trait of the `embedded_storage` crate.
/// The only erase unit is the whole chip.
mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{
        check_erase, check_read, check_write, ErrorType, NorFlash, ReadNorFlash,
    };

    impl<const SIZE: u32, P, D, DELAY, E> ErrorType for Sst39sf<SIZE, P, D, DELAY>
    where
        P: OutputPin<Error = E>,
        D: DataPin<Error = E>,
        DELAY: DelayNs,
        E: Debug,
    {
        type Error = Error<E>;
    }

    impl<const SIZE: u32, P, D, DELAY, E> ReadNorFlash for Sst39sf<SIZE, P, D, DELAY>
    where
        P: OutputPin<Error = E>,
        D: DataPin<Error = E>,
        DELAY: DelayNs,
        E: Debug,
    {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            check_read(self, offset, bytes.len())?;
            Sst39sf::read(self, Address(offset), bytes)
        }

        fn capacity(&self) -> usize {
            SIZE as usize
        }
    }

    impl<const SIZE: u32, P, D, DELAY, E> NorFlash for Sst39sf<SIZE, P, D, DELAY>
    where
        P: OutputPin<Error = E>,
        D: DataPin<Error = E>,
        DELAY: DelayNs,
        E: Debug,
    {
        const WRITE_SIZE: usize = 1;
        const ERASE_SIZE: usize = SIZE as usize;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            check_erase(self, from, to)?;
            if from == to {
                return Ok(());
            }
            self.erase_chip()
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            check_write(self, offset, bytes.len())?;
            Sst39sf::write(self, Address(offset), bytes)
        }
    }
}
