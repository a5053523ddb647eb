//! Mismatch accounting and the text lines pushed to the progress display.

use core::fmt::Write;

use crate::address::Address;

/// Lines a single [`ProgressSink::show`] call carries at most
pub const MAX_LINES: usize = 5;

/// One display line. 21 characters fit a 128px wide display at 6px per glyph,
/// the buffer leaves room for longer labels.
pub type Line = heapless::String<32>;

/// Fire-and-forget status output, typically a small character display.
pub trait ProgressSink {
    /// Replace whatever is shown with `lines`, at most [`MAX_LINES`] of them.
    fn show(&mut self, lines: &[&str]);
}

impl ProgressSink for () {
    fn show(&mut self, _lines: &[&str]) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for &mut T {
    fn show(&mut self, lines: &[&str]) {
        (**self).show(lines)
    }
}

/// `label` followed by `value` as zero-padded hex, `digits` wide
pub fn hex_line(label: &str, value: u32, digits: usize) -> Line {
    let mut line = Line::new();
    // Overlong lines are cut, never an error.
    let _ = write!(line, "{} 0x{:0width$X}", label, value, width = digits);
    line
}

pub fn count_line(label: &str, value: u32) -> Line {
    let mut line = Line::new();
    let _ = write!(line, "{} {}", label, value);
    line
}

/// Expected versus actual content at one address
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub address: Address,
    pub expected: u8,
    pub actual: u8,
}

/// Outcome of one verify pass
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationResult {
    /// Number of addresses compared, which is also one past the last one
    pub scanned: u32,
    pub mismatches: u32,
    /// The source had more bytes than the chip has addresses
    pub truncated: bool,
}

impl VerificationResult {
    pub fn last_address(&self) -> Option<Address> {
        self.scanned.checked_sub(1).map(Address)
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches == 0 && !self.truncated
    }
}

/// Outcome of one write pass
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub written: u32,
    pub truncated: bool,
}

/// Counts mismatches during a scan and reports each one as it is found.
///
/// A mismatch never stops the scan, so the final count covers the whole range.
/// The counter is a `u32`, enough for one event per address of any supported chip.
#[derive(Debug, Default)]
pub struct MismatchReporter {
    scanned: u32,
    mismatches: u32,
    truncated: bool,
}

impl MismatchReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<S: ProgressSink>(&mut self, mismatch: Mismatch, sink: &mut S) {
        self.mismatches += 1;
        log_warn!(
            "byte mismatch at {:#x}: expected {:#x}, read {:#x}",
            mismatch.address.0,
            mismatch.expected,
            mismatch.actual
        );
        let address = hex_line("Address:", mismatch.address.0, 5);
        let expected = hex_line("Expected:", mismatch.expected as u32, 2);
        let actual = hex_line("Actual:", mismatch.actual as u32, 2);
        sink.show(&[
            "Error! Byte mismatch",
            address.as_str(),
            expected.as_str(),
            actual.as_str(),
        ]);
    }

    /// Account for one compared address, recording it if the bytes differ.
    pub fn compare<S: ProgressSink>(
        &mut self,
        address: Address,
        expected: u8,
        actual: u8,
        sink: &mut S,
    ) {
        if expected != actual {
            self.record(
                Mismatch {
                    address,
                    expected,
                    actual,
                },
                sink,
            );
        }
        self.scanned = address.0 + 1;
    }

    pub(crate) fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    pub fn finalize(self) -> VerificationResult {
        VerificationResult {
            scanned: self.scanned,
            mismatches: self.mismatches,
            truncated: self.truncated,
        }
    }
}
