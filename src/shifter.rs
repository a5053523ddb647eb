//! Serialises an address into a chain of cascaded 74HC595 shift registers.
//!
//! The chain is clocked LSB first through SER/SRCLK and only transferred to the
//! outputs by a single RCLK pulse at the end, so the chip sees the previous
//! address until the new one is complete.

use embedded_hal::digital::{OutputPin, PinState};

use crate::{address::Address, error::Error};

pub struct AddressShifter<P> {
    serial_data: P,
    serial_clock: P,
    latch: P,
}

impl<P, E> AddressShifter<P>
where
    P: OutputPin<Error = E>,
{
    pub fn new(serial_data: P, serial_clock: P, latch: P) -> Self {
        Self {
            serial_data,
            serial_clock,
            latch,
        }
    }

    pub fn release(self) -> (P, P, P) {
        (self.serial_data, self.serial_clock, self.latch)
    }

    fn prepare(&mut self) -> Result<(), Error<E>> {
        self.latch.set_low().map_err(Error::Pin)?;
        self.serial_data.set_low().map_err(Error::Pin)?;
        self.serial_clock.set_low().map_err(Error::Pin)
    }

    /// Present `addr` on the register outputs. Bits above the chain width are dropped.
    pub fn shift_address<D>(
        &mut self,
        addr: Address,
        delay: &mut D,
        settle_ns: u32,
    ) -> Result<(), Error<E>>
    where
        D: embedded_hal::delay::DelayNs,
    {
        self.prepare()?;
        delay.delay_ns(settle_ns);

        for bit in addr.serial_bits() {
            self.serial_data
                .set_state(PinState::from(bit))
                .map_err(Error::Pin)?;
            delay.delay_ns(settle_ns);
            self.serial_clock.set_high().map_err(Error::Pin)?;
            delay.delay_ns(settle_ns);
            self.serial_clock.set_low().map_err(Error::Pin)?;
            delay.delay_ns(settle_ns);
        }

        self.latch.set_high().map_err(Error::Pin)?;
        delay.delay_ns(settle_ns);
        self.latch.set_low().map_err(Error::Pin)?;
        delay.delay_ns(settle_ns);
        Ok(())
    }

    /// Same as [`Self::shift_address`], awaiting each settle interval.
    pub async fn shift_address_async<D>(
        &mut self,
        addr: Address,
        delay: &mut D,
        settle_ns: u32,
    ) -> Result<(), Error<E>>
    where
        D: embedded_hal_async::delay::DelayNs,
    {
        self.prepare()?;
        delay.delay_ns(settle_ns).await;

        for bit in addr.serial_bits() {
            self.serial_data
                .set_state(PinState::from(bit))
                .map_err(Error::Pin)?;
            delay.delay_ns(settle_ns).await;
            self.serial_clock.set_high().map_err(Error::Pin)?;
            delay.delay_ns(settle_ns).await;
            self.serial_clock.set_low().map_err(Error::Pin)?;
            delay.delay_ns(settle_ns).await;
        }

        self.latch.set_high().map_err(Error::Pin)?;
        delay.delay_ns(settle_ns).await;
        self.latch.set_low().map_err(Error::Pin)?;
        delay.delay_ns(settle_ns).await;
        Ok(())
    }
}
