//! Erase, verify, write and verify passes over a whole chip.
//!
//! Every pass is synchronous and runs to completion. A byte mismatch is
//! counted and reported but never stops a pass; an error from the byte source
//! or the pins aborts the pass and leaves the programmer in [`Phase::Failed`].

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_io::Read;

use crate::{
    address::Address,
    blocking::Sst39sf,
    bus::DataPin,
    error::Error,
    report::{
        count_line, hex_line, MismatchReporter, ProgressSink, VerificationResult, WriteResult,
    },
    ERASED_BYTE,
};

/// Bytes pulled from the source at a time
pub const CHUNK_SIZE: usize = 1024;

/// What the user can ask for
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Erase,
    Write,
    VerifyErased,
    VerifyWritten,
}

impl Operation {
    /// The single-key commands of the serial console
    pub fn from_key(key: u8) -> Option<Operation> {
        match key {
            b'e' => Some(Operation::Erase),
            b'w' => Some(Operation::Write),
            b'v' => Some(Operation::VerifyErased),
            b'r' => Some(Operation::VerifyWritten),
            _ => None,
        }
    }

    pub fn needs_source(self) -> bool {
        matches!(self, Operation::Write | Operation::VerifyWritten)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Erasing,
    VerifyingErased,
    Writing,
    VerifyingWritten,
    Failed,
}

impl Phase {
    pub(crate) fn banner(self) -> &'static [&'static str] {
        match self {
            Phase::Idle => &["Ready"],
            Phase::Erasing => &["Erasing", "flash", "now..."],
            Phase::VerifyingErased => &["Verifying", "flash is", "erased now..."],
            Phase::Writing => &["Writing data", "to flash..."],
            Phase::VerifyingWritten => &["Reading data", "back from flash", "now..."],
            Phase::Failed => &["Error!", "Operation aborted"],
        }
    }
}

/// Result of [`Programmer::run`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Erased,
    Written(WriteResult),
    Verified(VerificationResult),
}

/// Result of a full [`Programmer::program_image`] run
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageReport {
    pub erase: VerificationResult,
    pub write: WriteResult,
    pub verify: VerificationResult,
}

impl ImageReport {
    pub fn is_clean(&self) -> bool {
        self.erase.is_clean() && !self.write.truncated && self.verify.is_clean()
    }
}

/// Walks the address space chunk by chunk and never past its end.
pub(crate) struct Cursor {
    next: u32,
    end: u32,
    truncated: bool,
}

impl Cursor {
    pub(crate) fn new(end: u32) -> Self {
        Self {
            next: 0,
            end,
            truncated: false,
        }
    }

    /// The part of `chunk` that still fits, and the address of its first byte
    pub(crate) fn take<'a>(&mut self, chunk: &'a [u8]) -> (Address, &'a [u8]) {
        let start = self.next;
        let room = (self.end - start) as usize;
        let fits = if chunk.len() > room {
            self.truncated = true;
            log_warn!(
                "source is larger than the chip, ignoring bytes past {:#x}",
                self.end
            );
            &chunk[..room]
        } else {
            chunk
        };
        self.next += fits.len() as u32;
        (Address(start), fits)
    }

    pub(crate) fn next(&self) -> u32 {
        self.next
    }

    pub(crate) fn truncated(&self) -> bool {
        self.truncated
    }
}

pub(crate) fn write_summary<S: ProgressSink>(sink: &mut S, result: &WriteResult) {
    let addrs = hex_line("Addrs:", result.written, 5);
    if result.truncated {
        sink.show(&["Done writing flash!", addrs.as_str(), "Source truncated!"]);
    } else {
        sink.show(&["Done writing flash!", addrs.as_str()]);
    }
}

pub(crate) fn verify_summary<S: ProgressSink>(sink: &mut S, result: &VerificationResult) {
    let addrs = hex_line("Addrs:", result.scanned, 5);
    let errors = count_line("Num errors:", result.mismatches);
    sink.show(&["Done reading flash!", addrs.as_str(), errors.as_str()]);
}

/// Drives an [`Sst39sf`] through whole-chip operations and reports progress to `S`.
pub struct Programmer<const SIZE: u32, P, D, DELAY, S> {
    flash: Sst39sf<SIZE, P, D, DELAY>,
    sink: S,
    phase: Phase,
}

impl<const SIZE: u32, P, D, DELAY, S, E> Programmer<SIZE, P, D, DELAY, S>
where
    P: OutputPin<Error = E>,
    D: DataPin<Error = E>,
    DELAY: DelayNs,
    S: ProgressSink,
{
    /// Takes over `flash` and puts the [`Phase::Idle`] banner on `sink`
    pub fn new(flash: Sst39sf<SIZE, P, D, DELAY>, mut sink: S) -> Self {
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

    pub fn flash(&mut self) -> &mut Sst39sf<SIZE, P, D, DELAY> {
        &mut self.flash
    }

    pub fn into_inner(self) -> (Sst39sf<SIZE, P, D, DELAY>, S) {
        (self.flash, self.sink)
    }

    fn enter(&mut self, phase: Phase) {
        log_info!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.sink.show(phase.banner());
    }

    /// Record the failure of the current phase, or go back to idle
    fn settle<T>(&mut self, result: Result<T, Error<E>>) -> Result<T, Error<E>> {
        match result.and_then(|v| self.flash.enter_idle().map(|_| v)) {
            Ok(v) => {
                self.phase = Phase::Idle;
                Ok(v)
            }
            Err(e) => {
                log_error!("{:?} failed", self.phase);
                // Any error from here is dropped, `e` is what gets returned.
                let _ = self.flash.enter_idle();
                self.enter(Phase::Failed);
                Err(e)
            }
        }
    }

    /// Run a single operation. `source` is only read by [`Operation::Write`] and
    /// [`Operation::VerifyWritten`]; hand in a freshly opened stream each time.
    pub fn run<R: Read>(&mut self, operation: Operation, source: R) -> Result<Outcome, Error<E>> {
        match operation {
            Operation::Erase => self.erase().map(|_| Outcome::Erased),
            Operation::Write => self.write_stream(source).map(Outcome::Written),
            Operation::VerifyErased => self.verify_erased().map(Outcome::Verified),
            Operation::VerifyWritten => self.verify_stream(source).map(Outcome::Verified),
        }
    }

    pub fn erase(&mut self) -> Result<(), Error<E>> {
        self.enter(Phase::Erasing);
        let result = self.flash.erase_chip();
        let result = self.settle(result);
        if result.is_ok() {
            self.sink.show(&["Chip erase", "Done!"]);
        }
        result
    }

    /// Read back every address and compare against [`ERASED_BYTE`]
    pub fn verify_erased(&mut self) -> Result<VerificationResult, Error<E>> {
        self.enter(Phase::VerifyingErased);
        let result = self.scan_erased();
        let result = self.settle(result)?;
        verify_summary(&mut self.sink, &result);
        Ok(result)
    }

    fn scan_erased(&mut self) -> Result<VerificationResult, Error<E>> {
        let mut reporter = MismatchReporter::new();
        self.flash.enter_read()?;
        for addr in 0..SIZE {
            let addr = Address(addr);
            let actual = self.flash.read_byte(addr)?;
            reporter.compare(addr, ERASED_BYTE, actual, &mut self.sink);
        }
        Ok(reporter.finalize())
    }

    /// Program every byte of `source` from address 0 up, until the source ends
    pub fn write_stream<R: Read>(&mut self, source: R) -> Result<WriteResult, Error<E>> {
        self.enter(Phase::Writing);
        let result = self.program_from(source);
        let result = self.settle(result)?;
        write_summary(&mut self.sink, &result);
        Ok(result)
    }

    fn program_from<R: Read>(&mut self, mut source: R) -> Result<WriteResult, Error<E>> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut cursor = Cursor::new(SIZE);
        self.flash.enter_write()?;
        loop {
            let n = source.read(&mut buf).map_err(Error::source)?;
            if n == 0 {
                break;
            }
            let (start, bytes) = cursor.take(&buf[..n]);
            for (i, byte) in bytes.iter().enumerate() {
                self.flash.write_byte(Address(start.0 + i as u32), *byte)?;
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

    /// Compare the chip against `source`, from address 0 up
    pub fn verify_stream<R: Read>(&mut self, source: R) -> Result<VerificationResult, Error<E>> {
        self.enter(Phase::VerifyingWritten);
        let result = self.compare_with(source);
        let result = self.settle(result)?;
        verify_summary(&mut self.sink, &result);
        Ok(result)
    }

    fn compare_with<R: Read>(&mut self, mut source: R) -> Result<VerificationResult, Error<E>> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut cursor = Cursor::new(SIZE);
        let mut reporter = MismatchReporter::new();
        self.flash.enter_read()?;
        loop {
            let n = source.read(&mut buf).map_err(Error::source)?;
            if n == 0 {
                break;
            }
            let (start, bytes) = cursor.take(&buf[..n]);
            for (i, expected) in bytes.iter().enumerate() {
                let addr = Address(start.0 + i as u32);
                let actual = self.flash.read_byte(addr)?;
                reporter.compare(addr, *expected, actual, &mut self.sink);
            }
            if cursor.truncated() {
                reporter.mark_truncated();
                break;
            }
        }
        Ok(reporter.finalize())
    }

    /// Erase, check the erase, write `open()` and check it against a second
    /// `open()`. The source is opened twice since streams are forward only.
    pub fn program_image<R, F>(&mut self, mut open: F) -> Result<ImageReport, Error<E>>
    where
        R: Read,
        F: FnMut() -> Result<R, R::Error>,
    {
        self.erase()?;
        let erase = self.verify_erased()?;

        let source = self.open_source(&mut open)?;
        let write = self.write_stream(source)?;

        let source = self.open_source(&mut open)?;
        let verify = self.verify_stream(source)?;

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
        match open() {
            Ok(source) => Ok(source),
            Err(e) => {
                self.enter(Phase::Failed);
                Err(Error::source(e))
            }
        }
    }
}
