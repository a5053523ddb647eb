#![no_std]
//! This is a platform agnostic driver and programmer for the SST39SF0x0 parallel NOR flash series using [embedded-hal](https://github.com/rust-embedded/embedded-hal).
//!
//! The chip needs 19 address lines, 8 data lines and 3 control lines, more than a
//! small microcontroller usually has to spare. The address is therefore shifted
//! out through three cascaded 74HC595 shift registers, and only the data and
//! control lines are wired directly. Writes and the chip erase use the vendor's
//! software unlock sequences, and completion is waited for with fixed delays
//! (see [`Timing`]) since the chip is never polled.
//!
//! Multiple chips are supported:
//! * [SST39SF010A](https://ww1.microchip.com/downloads/en/DeviceDoc/20005022C.pdf)
//! * [SST39SF020A](https://ww1.microchip.com/downloads/en/DeviceDoc/20005022C.pdf)
//! * [SST39SF040](https://ww1.microchip.com/downloads/en/DeviceDoc/20005022C.pdf)
//!
//! [`blocking::Sst39sf`] is the byte-level driver, [`workflow::Programmer`] runs
//! the erase, verify, write and verify passes on top of it against any
//! [`embedded_io::Read`] byte source. The [`asynchronous`] module has the same
//! for async executors.

mod fmt;

pub mod address;
pub mod asynchronous;
pub mod blocking;
pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod id;
pub mod report;
pub mod shifter;
pub mod workflow;

pub use crate::config::Timing;

/// The value of every byte after a chip erase
pub const ERASED_BYTE: u8 = 0xFF;

/// Every line between the microcontroller and the programmer board.
///
/// The shift-register and control lines share one output pin type, the data
/// lines need a pin that can change direction, see [`bus::DataPin`].
pub struct Pins<P, D> {
    /// SER of the first 74HC595
    pub serial_data: P,
    /// SRCLK, shared by the whole chain
    pub serial_clock: P,
    /// RCLK, shared by the whole chain
    pub latch: P,
    /// WE#
    pub write_enable: P,
    /// OE#
    pub output_enable: P,
    /// CE#
    pub chip_enable: P,
    /// D0 to D7
    pub data: [D; 8],
}
