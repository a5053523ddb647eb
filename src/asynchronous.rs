//! Same driver and passes as [`crate::blocking`] and [`crate::workflow`], with
//! every wait awaited so an executor can run other tasks during the program
//! and erase times. Pin accesses stay synchronous.

use crate::{
    address::{Address, SST39SF010A_SIZE, SST39SF020A_SIZE, SST39SF040_SIZE},
    blocking::check_range,
    bus::{BusMode, BusModeController, DataPin},
    command::CommandSequence,
    error::Error,
    id::{DeviceId, ManufacturerId, ProductId},
    report::{MismatchReporter, ProgressSink, VerificationResult, WriteResult},
    shifter::AddressShifter,
    workflow::{
        verify_summary, write_summary, Cursor, ImageReport, Operation, Outcome, Phase, CHUNK_SIZE,
    },
    Pins, Timing, ERASED_BYTE,
};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Read;
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};

/// Type alias for the AsyncSst39sf010a
pub type AsyncSst39sf010a<P, D, DELAY> = AsyncSst39sf<SST39SF010A_SIZE, P, D, DELAY>;

/// Type alias for the AsyncSst39sf020a
pub type AsyncSst39sf020a<P, D, DELAY> = AsyncSst39sf<SST39SF020A_SIZE, P, D, DELAY>;

/// Type alias for the AsyncSst39sf040
pub type AsyncSst39sf040<P, D, DELAY> = AsyncSst39sf<SST39SF040_SIZE, P, D, DELAY>;

/// The generic async SST39SF driver
pub struct AsyncSst39sf<const SIZE: u32, P, D, DELAY> {
    shifter: AddressShifter<P>,
    bus: BusModeController<P, D>,
    delay: DELAY,
    timing: Timing,
}

impl<const SIZE: u32, P, D, DELAY, E> AsyncSst39sf<SIZE, P, D, DELAY>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
{
    pub const fn capacity() -> usize {
        SIZE as usize
    }

    pub async fn new(pins: Pins<P, D>, delay: DELAY) -> Result<Self, Error<E>> {
        Self::with_timing(pins, delay, Timing::default()).await
    }

    pub async fn with_timing(
        pins: Pins<P, D>,
        delay: DELAY,
        timing: Timing,
    ) -> Result<Self, Error<E>> {
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
        flash.enter_idle().await?;
        Ok(flash)
    }

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

    pub fn mode(&self) -> BusMode {
        self.bus.mode()
    }

    pub fn verify_addr(addr: Address) -> Result<Address, Error<E>> {
        if addr.0 >= SIZE {
            return Err(Error::OutOfBounds);
        }
        Ok(addr)
    }

    pub async fn enter_read(&mut self) -> Result<(), Error<E>> {
        self.bus.enter_read_async(&mut self.delay, &self.timing).await
    }

    pub async fn enter_write(&mut self) -> Result<(), Error<E>> {
        self.bus
            .enter_write_async(&mut self.delay, &self.timing)
            .await
    }

    pub async fn enter_idle(&mut self) -> Result<(), Error<E>> {
        self.bus.enter_idle_async(&mut self.delay, &self.timing).await
    }

    async fn ensure_read(&mut self) -> Result<(), Error<E>> {
        if self.bus.mode() != BusMode::Read {
            self.enter_read().await?;
        }
        Ok(())
    }

    async fn ensure_write(&mut self) -> Result<(), Error<E>> {
        if self.bus.mode() != BusMode::Write {
            self.enter_write().await?;
        }
        Ok(())
    }

    async fn write_cycle(&mut self, addr: Address, data: u8) -> Result<(), Error<E>> {
        let timing = self.timing;

        self.bus.open_cycle()?;
        self.delay.delay_ns(timing.settle_ns).await;

        self.shifter
            .shift_address_async(addr, &mut self.delay, timing.settle_ns)
            .await?;
        self.bus.set_data(data)?;
        self.delay.delay_ns(timing.settle_ns).await;

        self.bus.set_write_strobe(true)?;
        self.delay.delay_ns(timing.write_pulse_ns).await;
        self.bus.set_write_strobe(false)?;
        self.delay.delay_ns(timing.write_pulse_ns).await;

        self.bus.close_cycle()?;
        self.delay.delay_us(timing.program_us).await;
        Ok(())
    }

    async fn replay(&mut self, sequence: CommandSequence) -> Result<(), Error<E>> {
        for (addr, data) in sequence.cycles() {
            self.write_cycle(addr, data).await?;
        }
        Ok(())
    }

    pub async fn write_byte(&mut self, addr: Address, data: u8) -> Result<(), Error<E>> {
        let addr = Self::verify_addr(addr)?;
        self.ensure_write().await?;
        self.replay(CommandSequence::BYTE_PROGRAM).await?;
        self.write_cycle(addr, data).await
    }

    pub async fn write(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error<E>> {
        check_range::<SIZE, E>(addr, bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            self.write_byte(Address(addr.0 + i as u32), *byte).await?;
        }
        Ok(())
    }

    pub async fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.ensure_write().await?;
        log_trace!("chip erase");
        self.replay(CommandSequence::CHIP_ERASE).await?;
        self.delay.delay_ms(self.timing.erase_ms).await;
        Ok(())
    }

    async fn read_cycle(&mut self, addr: Address) -> Result<u8, Error<E>> {
        self.shifter
            .shift_address_async(addr, &mut self.delay, self.timing.settle_ns)
            .await?;
        self.delay.delay_ns(self.timing.settle_ns).await;
        self.bus.read_data()
    }

    pub async fn read_byte(&mut self, addr: Address) -> Result<u8, Error<E>> {
        let addr = Self::verify_addr(addr)?;
        self.ensure_read().await?;
        self.read_cycle(addr).await
    }

    pub async fn read(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        check_range::<SIZE, E>(addr, buff.len())?;
        self.ensure_read().await?;
        for (i, byte) in buff.iter_mut().enumerate() {
            *byte = self.read_cycle(Address(addr.0 + i as u32)).await?;
        }
        Ok(())
    }

    pub async fn read_product_id(&mut self) -> Result<ProductId, Error<E>> {
        self.ensure_write().await?;
        self.replay(CommandSequence::SOFTWARE_ID_ENTRY).await?;

        self.enter_read().await?;
        let manufacturer = self.read_cycle(Address(0x0000)).await?;
        let device = self.read_cycle(Address(0x0001)).await?;

        self.enter_write().await?;
        self.replay(CommandSequence::SOFTWARE_ID_EXIT).await?;

        log_debug!("product id {:#x} {:#x}", manufacturer, device);
        Ok(ProductId {
            manufacturer: ManufacturerId(manufacturer),
            device: DeviceId(device),
        })
    }
}

impl<const SIZE: u32, P, D, DELAY, E> embedded_storage_async::nor_flash::ErrorType
    for AsyncSst39sf<SIZE, P, D, DELAY>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    type Error = Error<E>;
}

impl<const SIZE: u32, P, D, DELAY, E> ReadNorFlash for AsyncSst39sf<SIZE, P, D, DELAY>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        AsyncSst39sf::read(self, Address(offset), bytes).await
    }

    fn capacity(&self) -> usize {
        SIZE as usize
    }
}

impl<const SIZE: u32, P, D, DELAY, E> NorFlash for AsyncSst39sf<SIZE, P, D, DELAY>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = SIZE as usize;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to || to > SIZE {
            return Err(Error::OutOfBounds);
        }
        if from % SIZE != 0 || to % SIZE != 0 {
            return Err(Error::NotAligned);
        }
        if from == to {
            return Ok(());
        }
        self.erase_chip().await
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        AsyncSst39sf::write(self, Address(offset), bytes).await
    }
}

/// Async counterpart of [`crate::workflow::Programmer`]
pub struct AsyncProgrammer<const SIZE: u32, P, D, DELAY, S> {
    flash: AsyncSst39sf<SIZE, P, D, DELAY>,
    sink: S,
    phase: Phase,
}

impl<const SIZE: u32, P, D, DELAY, S, E> AsyncProgrammer<SIZE, P, D, DELAY, S>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
    S: ProgressSink,
{
    /// Takes over `flash` and puts the [`Phase::Idle`] banner on `sink`
    pub fn new(flash: AsyncSst39sf<SIZE, P, D, DELAY>, mut sink: S) -> Self {
        sink.show(Phase::Idle.banner());
        Self {
            flash,
            sink,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn flash(&mut self) -> &mut AsyncSst39sf<SIZE, P, D, DELAY> {
        &mut self.flash
    }

    pub fn into_inner(self) -> (AsyncSst39sf<SIZE, P, D, DELAY>, S) {
        (self.flash, self.sink)
    }

    fn enter(&mut self, phase: Phase) {
        log_info!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.sink.show(phase.banner());
    }

    async fn settle<T>(&mut self, result: Result<T, Error<E>>) -> Result<T, Error<E>> {
        let result = match result {
            Ok(v) => self.flash.enter_idle().await.map(|_| v),
            Err(e) => Err(e),
        };
        match result {
            Ok(v) => {
                self.phase = Phase::Idle;
                Ok(v)
            }
            Err(e) => {
                log_error!("{:?} failed", self.phase);
                // Any error from here is dropped, `e` is what gets returned.
                let _ = self.flash.enter_idle().await;
                self.enter(Phase::Failed);
                Err(e)
            }
        }
    }

    pub async fn run<R: Read>(
        &mut self,
        operation: Operation,
        source: R,
    ) -> Result<Outcome, Error<E>> {
        match operation {
            Operation::Erase => self.erase().await.map(|_| Outcome::Erased),
            Operation::Write => self.write_stream(source).await.map(Outcome::Written),
            Operation::VerifyErased => self.verify_erased().await.map(Outcome::Verified),
            Operation::VerifyWritten => self.verify_stream(source).await.map(Outcome::Verified),
        }
    }

    pub async fn erase(&mut self) -> Result<(), Error<E>> {
        self.enter(Phase::Erasing);
        let result = self.flash.erase_chip().await;
        let result = self.settle(result).await;
        if result.is_ok() {
            self.sink.show(&["Chip erase", "Done!"]);
        }
        result
    }

    pub async fn verify_erased(&mut self) -> Result<VerificationResult, Error<E>> {
        self.enter(Phase::VerifyingErased);
        let result = self.scan_erased().await;
        let result = self.settle(result).await?;
        verify_summary(&mut self.sink, &result);
        Ok(result)
    }

    async fn scan_erased(&mut self) -> Result<VerificationResult, Error<E>> {
        let mut reporter = MismatchReporter::new();
        self.flash.enter_read().await?;
        for addr in 0..SIZE {
            let addr = Address(addr);
            let actual = self.flash.read_byte(addr).await?;
            reporter.compare(addr, ERASED_BYTE, actual, &mut self.sink);
        }
        Ok(reporter.finalize())
    }

    pub async fn write_stream<R: Read>(&mut self, source: R) -> Result<WriteResult, Error<E>> {
        self.enter(Phase::Writing);
        let result = self.program_from(source).await;
        let result = self.settle(result).await?;
        write_summary(&mut self.sink, &result);
        Ok(result)
    }

    async fn program_from<R: Read>(&mut self, mut source: R) -> Result<WriteResult, Error<E>> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut cursor = Cursor::new(SIZE);
        self.flash.enter_write().await?;
        loop {
            let n = source.read(&mut buf).await.map_err(Error::source)?;
            if n == 0 {
                break;
            }
            let (start, bytes) = cursor.take(&buf[..n]);
            for (i, byte) in bytes.iter().enumerate() {
                self.flash
                    .write_byte(Address(start.0 + i as u32), *byte)
                    .await?;
            }
            if cursor.truncated() {
                break;
            }
        }
        Ok(WriteResult {
            written: cursor.next(),
            truncated: cursor.truncated(),
        })
    }

    pub async fn verify_stream<R: Read>(
        &mut self,
        source: R,
    ) -> Result<VerificationResult, Error<E>> {
        self.enter(Phase::VerifyingWritten);
        let result = self.compare_with(source).await;
        let result = self.settle(result).await?;
        verify_summary(&mut self.sink, &result);
        Ok(result)
    }

    async fn compare_with<R: Read>(
        &mut self,
        mut source: R,
    ) -> Result<VerificationResult, Error<E>> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut cursor = Cursor::new(SIZE);
        let mut reporter = MismatchReporter::new();
        self.flash.enter_read().await?;
        loop {
            let n = source.read(&mut buf).await.map_err(Error::source)?;
            if n == 0 {
                break;
            }
            let (start, bytes) = cursor.take(&buf[..n]);
            for (i, expected) in bytes.iter().enumerate() {
                let addr = Address(start.0 + i as u32);
                let actual = self.flash.read_byte(addr).await?;
                reporter.compare(addr, *expected, actual, &mut self.sink);
            }
            if cursor.truncated() {
                reporter.mark_truncated();
                break;
            }
        }
        Ok(reporter.finalize())
    }

    /// See [`crate::workflow::Programmer::program_image`]
    pub async fn program_image<R, F>(&mut self, mut open: F) -> Result<ImageReport, Error<E>>
    where
        R: Read,
        F: FnMut() -> Result<R, R::Error>,
    {
        self.erase().await?;
        let erase = self.verify_erased().await?;

        let source = self.open_source(&mut open)?;
        let write = self.write_stream(source).await?;

        let source = self.open_source(&mut open)?;
        let verify = self.verify_stream(source).await?;

        Ok(ImageReport {
            erase,
            write,
            verify,
        })
    }

    fn open_source<R, F>(&mut self, open: &mut F) -> Result<R, Error<E>>
    where
        R: Read,
        F: FnMut() -> Result<R, R::Error>,
    {
        open().map_err(|e| {
            self.enter(Phase::Failed);
            Error::source(e)
        })
    }
}
