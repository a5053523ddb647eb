//! Electrical mode of the 8-bit data bus and the CE#/OE#/WE# control lines.
//!
//! This is the only place where a data line changes direction. Every
//! transition releases the side that is currently driving before the other
//! side is allowed to drive: OE# goes high before the data lines become
//! outputs, and the data lines are inputs before OE# goes low.
//!
//! A transition that stops half way leaves the controller in
//! [`BusMode::Unknown`], which every data access rejects and every later
//! transition treats as "anything may be driving".

use bit::BitIndex;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::error::Error;

/// A data line that can be switched between input and output at runtime.
///
/// embedded-hal has no direction-changing pin trait, HALs expose this as a
/// flex/dynamic pin. Implement it on top of that.
pub trait DataPin: InputPin + OutputPin {
    /// Stop driving the line and pull it down so it never floats.
    fn set_as_input_pull_down(&mut self) -> Result<(), Self::Error>;

    /// Start driving the line with the last level set through [`OutputPin`].
    fn set_as_output(&mut self) -> Result<(), Self::Error>;
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusMode {
    /// Chip enabled, neither side drives the data lines
    Idle,
    /// Data lines are inputs, the chip drives them (OE# and CE# asserted)
    Read,
    /// Data lines are outputs, OE# de-asserted and WE# ready to strobe
    Write,
    /// A transition did not complete, the lines may be in any state. Only
    /// another `enter_*` gets out of it.
    Unknown,
}

pub struct BusModeController<P, D> {
    write_enable: P,
    output_enable: P,
    chip_enable: P,
    data: [D; 8],
    mode: BusMode,
}

/// Active-low control line level
fn level(asserted: bool) -> PinState {
    PinState::from(!asserted)
}

impl<P, D, E> BusModeController<P, D>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
{
    /// Takes the pins as they are, so the mode starts out [`BusMode::Unknown`].
    /// Call one of the `enter_*` transitions before anything else, the driver
    /// does this with [`Self::enter_idle`].
    pub fn new(write_enable: P, output_enable: P, chip_enable: P, data: [D; 8]) -> Self {
        Self {
            write_enable,
            output_enable,
            chip_enable,
            data,
            mode: BusMode::Unknown,
        }
    }

    pub fn release(self) -> (P, P, P, [D; 8]) {
        (
            self.write_enable,
            self.output_enable,
            self.chip_enable,
            self.data,
        )
    }

    pub fn mode(&self) -> BusMode {
        self.mode
    }

    /// Mark the bus as in no known mode until the transition completes,
    /// returning the mode it leaves.
    fn begin_transition(&mut self) -> BusMode {
        core::mem::replace(&mut self.mode, BusMode::Unknown)
    }

    fn check_mode(&self, expected: BusMode) -> Result<(), Error<E>> {
        if self.mode != expected {
            return Err(Error::BusMode {
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }

    fn set_write_enable(&mut self, asserted: bool) -> Result<(), Error<E>> {
        self.write_enable
            .set_state(level(asserted))
            .map_err(Error::Pin)
    }

    fn set_output_enable(&mut self, asserted: bool) -> Result<(), Error<E>> {
        self.output_enable
            .set_state(level(asserted))
            .map_err(Error::Pin)
    }

    fn set_chip_enable(&mut self, asserted: bool) -> Result<(), Error<E>> {
        self.chip_enable
            .set_state(level(asserted))
            .map_err(Error::Pin)
    }

    /// Silence the chip's output drivers.
    fn release_chip_drive(&mut self) -> Result<(), Error<E>> {
        self.set_write_enable(false)?;
        self.set_output_enable(false)
    }

    fn data_low(&mut self) -> Result<(), Error<E>> {
        for pin in self.data.iter_mut() {
            pin.set_low().map_err(Error::Pin)?;
        }
        Ok(())
    }

    fn data_as_inputs(&mut self) -> Result<(), Error<E>> {
        for pin in self.data.iter_mut() {
            pin.set_as_input_pull_down().map_err(Error::Pin)?;
        }
        Ok(())
    }

    fn data_as_outputs(&mut self) -> Result<(), Error<E>> {
        for pin in self.data.iter_mut() {
            pin.set_low().map_err(Error::Pin)?;
            pin.set_as_output().map_err(Error::Pin)?;
        }
        Ok(())
    }

    /// Data lines pulled-down inputs, then OE# and CE# asserted with WE# high.
    pub fn enter_read<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal::delay::DelayNs,
    {
        let from = self.begin_transition();
        if from == BusMode::Unknown {
            self.release_chip_drive()?;
            delay.delay_ns(timing.settle_ns);
        }
        if matches!(from, BusMode::Write | BusMode::Unknown) {
            self.data_low()?;
            delay.delay_ns(timing.settle_ns);
        }
        self.data_as_inputs()?;
        delay.delay_us(timing.direction_settle_us);

        self.set_write_enable(false)?;
        self.set_output_enable(true)?;
        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns);

        self.mode = BusMode::Read;
        log_trace!("bus: read mode");
        Ok(())
    }

    /// OE# released first, then the data lines become outputs driving low
    /// and CE# is asserted. WE# stays high, ready to strobe.
    pub fn enter_write<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal::delay::DelayNs,
    {
        self.begin_transition();
        self.release_chip_drive()?;
        delay.delay_ns(timing.settle_ns);

        self.data_as_outputs()?;
        delay.delay_us(timing.direction_settle_us);

        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns);

        self.mode = BusMode::Write;
        log_trace!("bus: write mode");
        Ok(())
    }

    /// Nobody drives the data lines; the chip stays selected.
    pub fn enter_idle<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal::delay::DelayNs,
    {
        let from = self.begin_transition();
        self.release_chip_drive()?;
        delay.delay_ns(timing.settle_ns);

        if matches!(from, BusMode::Write | BusMode::Unknown) {
            self.data_low()?;
            delay.delay_ns(timing.settle_ns);
        }
        self.data_as_inputs()?;
        delay.delay_us(timing.direction_settle_us);

        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns);

        self.mode = BusMode::Idle;
        log_trace!("bus: idle");
        Ok(())
    }

    pub async fn enter_read_async<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal_async::delay::DelayNs,
    {
        let from = self.begin_transition();
        if from == BusMode::Unknown {
            self.release_chip_drive()?;
            delay.delay_ns(timing.settle_ns).await;
        }
        if matches!(from, BusMode::Write | BusMode::Unknown) {
            self.data_low()?;
            delay.delay_ns(timing.settle_ns).await;
        }
        self.data_as_inputs()?;
        delay.delay_us(timing.direction_settle_us).await;

        self.set_write_enable(false)?;
        self.set_output_enable(true)?;
        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns).await;

        self.mode = BusMode::Read;
        log_trace!("bus: read mode");
        Ok(())
    }

    pub async fn enter_write_async<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal_async::delay::DelayNs,
    {
        self.begin_transition();
        self.release_chip_drive()?;
        delay.delay_ns(timing.settle_ns).await;

        self.data_as_outputs()?;
        delay.delay_us(timing.direction_settle_us).await;

        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns).await;

        self.mode = BusMode::Write;
        log_trace!("bus: write mode");
        Ok(())
    }

    pub async fn enter_idle_async<DL>(
        &mut self,
        delay: &mut DL,
        timing: &crate::Timing,
    ) -> Result<(), Error<E>>
    where
        DL: embedded_hal_async::delay::DelayNs,
    {
        let from = self.begin_transition();
        self.release_chip_drive()?;
        delay.delay_ns(timing.settle_ns).await;

        if matches!(from, BusMode::Write | BusMode::Unknown) {
            self.data_low()?;
            delay.delay_ns(timing.settle_ns).await;
        }
        self.data_as_inputs()?;
        delay.delay_us(timing.direction_settle_us).await;

        self.set_chip_enable(true)?;
        delay.delay_ns(timing.settle_ns).await;

        self.mode = BusMode::Idle;
        log_trace!("bus: idle");
        Ok(())
    }

    /// Drive D0..D7 with the bits of `byte`. Only valid in write mode.
    pub fn set_data(&mut self, byte: u8) -> Result<(), Error<E>> {
        self.check_mode(BusMode::Write)?;
        for (i, pin) in self.data.iter_mut().enumerate() {
            pin.set_state(PinState::from(byte.bit(i)))
                .map_err(Error::Pin)?;
        }
        Ok(())
    }

    /// Sample D7..D0. Only valid in read mode.
    pub fn read_data(&mut self) -> Result<u8, Error<E>> {
        self.check_mode(BusMode::Read)?;
        let mut byte = 0u8;
        for (i, pin) in self.data.iter_mut().enumerate().rev() {
            byte.set_bit(i, pin.is_high().map_err(Error::Pin)?);
        }
        Ok(byte)
    }

    /// Start of a write cycle: OE# and WE# high, CE# low.
    pub(crate) fn open_cycle(&mut self) -> Result<(), Error<E>> {
        self.check_mode(BusMode::Write)?;
        self.release_chip_drive()?;
        self.set_chip_enable(true)
    }

    pub(crate) fn set_write_strobe(&mut self, low: bool) -> Result<(), Error<E>> {
        self.check_mode(BusMode::Write)?;
        self.set_write_enable(low)
    }

    /// End of a write cycle: CE# released, the chip starts programming.
    pub(crate) fn close_cycle(&mut self) -> Result<(), Error<E>> {
        self.check_mode(BusMode::Write)?;
        self.set_chip_enable(false)
    }
}
