//! A simulated programmer board: three cascaded 74HC595 in front of an SST39SF,
//! wired to pins that record every transition.
#![allow(dead_code)]

use std::{
    cell::{RefCell, RefMut},
    collections::HashMap,
    convert::Infallible,
    rc::Rc,
};

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use sst39sf::{
    blocking::Sst39sf, bus::DataPin, id::SST_MANUFACTURER_ID, report::ProgressSink, Pins, Timing,
};

/// Address space of the simulated chip. Large enough for the 0x5555 unlock address.
pub const CHIP_SIZE: usize = 0x8000;

/// Device ID the simulated chip answers in software ID mode
pub const DEVICE_ID: u8 = 0xB7;

pub const PROGRAM_TIME_NS: u64 = 20_000;
pub const ERASE_TIME_NS: u64 = 100_000_000;

const CHAIN_MASK: u32 = 0xFF_FFFF;

pub type Flash<const SIZE: u32> = Sst39sf<SIZE, SimPin, SimPin, SimDelay>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    SerialData,
    SerialClock,
    Latch,
    WriteEnable,
    OutputEnable,
    ChipEnable,
    Data(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl digital::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Ready,
    Unlock1,
    Unlock2,
    Program,
    EraseSetup,
    EraseUnlock1,
    EraseUnlock2,
}

/// One completed bus write cycle as seen by the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWrite {
    pub address: u32,
    pub data: u8,
    pub at_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSnapshot {
    pub levels: Vec<(Line, bool)>,
    pub outputs: [bool; 8],
}

pub struct ChipState {
    pub memory: Vec<u8>,
    /// Reads at these addresses return the given byte instead of the memory
    pub stuck: HashMap<u32, u8>,
    /// Every operation on this line fails
    pub broken: Option<Line>,

    levels: HashMap<Line, bool>,
    data_is_output: [bool; 8],
    shift: u32,
    pub latched: u32,
    cycle_address: u32,
    command: Command,
    pub id_mode: bool,

    pub now_ns: u64,
    busy_until_ns: u64,

    pub writes: Vec<BusWrite>,
    pub transitions: Vec<(Line, bool)>,
    pub contention: u32,
    pub busy_violations: u32,
    pub floating_writes: u32,
    pub programs: u32,
    pub erases: u32,
}

impl ChipState {
    fn new() -> Self {
        let mut levels = HashMap::new();
        levels.insert(Line::WriteEnable, true);
        levels.insert(Line::OutputEnable, true);
        levels.insert(Line::ChipEnable, true);
        Self {
            memory: vec![0x00; CHIP_SIZE],
            stuck: HashMap::new(),
            broken: None,
            levels,
            data_is_output: [false; 8],
            shift: 0,
            latched: 0,
            cycle_address: 0,
            command: Command::Ready,
            id_mode: false,
            now_ns: 0,
            busy_until_ns: 0,
            writes: Vec::new(),
            transitions: Vec::new(),
            contention: 0,
            busy_violations: 0,
            floating_writes: 0,
            programs: 0,
            erases: 0,
        }
    }

    pub fn level(&self, line: Line) -> bool {
        self.levels.get(&line).copied().unwrap_or(false)
    }

    pub fn data_is_output(&self, i: usize) -> bool {
        self.data_is_output[i]
    }

    /// Everything the chip can observe of the bus lines
    pub fn bus_snapshot(&self) -> BusSnapshot {
        let mut lines = vec![Line::WriteEnable, Line::OutputEnable, Line::ChipEnable];
        lines.extend((0..8).map(Line::Data));
        BusSnapshot {
            levels: lines.into_iter().map(|l| (l, self.level(l))).collect(),
            outputs: self.data_is_output,
        }
    }

    fn chip_drives_bus(&self) -> bool {
        !self.level(Line::OutputEnable)
            && !self.level(Line::ChipEnable)
            && self.level(Line::WriteEnable)
    }

    fn check_contention(&mut self) {
        if self.chip_drives_bus() && self.data_is_output.iter().any(|o| *o) {
            self.contention += 1;
        }
    }

    fn set_direction(&mut self, i: usize, output: bool) {
        self.data_is_output[i] = output;
        self.check_contention();
    }

    fn set_level(&mut self, line: Line, high: bool) {
        let was = self.level(line);
        self.levels.insert(line, high);
        if was != high {
            self.transitions.push((line, high));
        }
        let rising = !was && high;
        let falling = was && !high;

        match line {
            Line::SerialClock if rising => {
                let bit = self.level(Line::SerialData) as u32;
                self.shift = ((self.shift >> 1) | (bit << 23)) & CHAIN_MASK;
            }
            Line::Latch if rising => self.latched = self.shift,
            Line::WriteEnable if falling && self.selected_for_write() => {
                self.cycle_address = self.latched;
            }
            Line::WriteEnable if rising && self.selected_for_write() => {
                let data = self.bus_value();
                self.accept_write(self.cycle_address, data);
            }
            Line::OutputEnable | Line::ChipEnable => self.check_contention(),
            _ => {}
        }
    }

    fn selected_for_write(&self) -> bool {
        !self.level(Line::ChipEnable) && self.level(Line::OutputEnable)
    }

    fn bus_value(&mut self) -> u8 {
        let mut value = 0u8;
        for i in 0..8 {
            if !self.data_is_output[i] {
                self.floating_writes += 1;
            } else if self.level(Line::Data(i)) {
                value |= 1 << i;
            }
        }
        value
    }

    fn index(&self, address: u32) -> usize {
        address as usize % self.memory.len()
    }

    fn accept_write(&mut self, address: u32, data: u8) {
        self.writes.push(BusWrite {
            address,
            data,
            at_ns: self.now_ns,
        });
        if self.now_ns < self.busy_until_ns {
            self.busy_violations += 1;
        }

        let command_address = address & 0x7FFF;
        self.command = match (self.command, command_address, data) {
            (Command::Ready, _, 0xF0) => {
                self.id_mode = false;
                Command::Ready
            }
            (Command::Ready, 0x5555, 0xAA) => Command::Unlock1,
            (Command::Unlock1, 0x2AAA, 0x55) => Command::Unlock2,
            (Command::Unlock2, 0x5555, 0xA0) => Command::Program,
            (Command::Unlock2, 0x5555, 0x80) => Command::EraseSetup,
            (Command::Unlock2, 0x5555, 0x90) => {
                self.id_mode = true;
                Command::Ready
            }
            (Command::Unlock2, 0x5555, 0xF0) => {
                self.id_mode = false;
                Command::Ready
            }
            (Command::Program, _, _) => {
                let i = self.index(address);
                self.memory[i] &= data;
                self.programs += 1;
                self.busy_until_ns = self.now_ns + PROGRAM_TIME_NS;
                Command::Ready
            }
            (Command::EraseSetup, 0x5555, 0xAA) => Command::EraseUnlock1,
            (Command::EraseUnlock1, 0x2AAA, 0x55) => Command::EraseUnlock2,
            (Command::EraseUnlock2, 0x5555, 0x10) => {
                self.memory.iter_mut().for_each(|b| *b = 0xFF);
                self.erases += 1;
                self.busy_until_ns = self.now_ns + ERASE_TIME_NS;
                Command::Ready
            }
            _ => Command::Ready,
        };
    }

    fn output_byte(&self) -> u8 {
        let address = self.latched;
        if self.id_mode {
            return match address & 1 {
                0 => SST_MANUFACTURER_ID,
                _ => DEVICE_ID,
            };
        }
        match self.stuck.get(&address) {
            Some(byte) => *byte,
            None => self.memory[self.index(address)],
        }
    }

    fn sample(&self, i: usize) -> bool {
        if self.data_is_output[i] {
            self.level(Line::Data(i))
        } else if self.chip_drives_bus() {
            self.output_byte() & (1 << i) != 0
        } else {
            false
        }
    }
}

/// The whole board, cheap to clone
#[derive(Clone)]
pub struct Sim(Rc<RefCell<ChipState>>);

impl Sim {
    pub fn new() -> Self {
        Sim(Rc::new(RefCell::new(ChipState::new())))
    }

    pub fn state(&self) -> RefMut<'_, ChipState> {
        self.0.borrow_mut()
    }

    fn pin(&self, line: Line) -> SimPin {
        SimPin {
            line,
            state: self.0.clone(),
        }
    }

    pub fn pins(&self) -> Pins<SimPin, SimPin> {
        Pins {
            serial_data: self.pin(Line::SerialData),
            serial_clock: self.pin(Line::SerialClock),
            latch: self.pin(Line::Latch),
            write_enable: self.pin(Line::WriteEnable),
            output_enable: self.pin(Line::OutputEnable),
            chip_enable: self.pin(Line::ChipEnable),
            data: core::array::from_fn(|i| self.pin(Line::Data(i))),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.0.clone())
    }

    pub fn flash<const SIZE: u32>(&self) -> Flash<SIZE> {
        Sst39sf::with_timing(self.pins(), self.delay(), Timing::DATASHEET).unwrap()
    }

    /// Preload memory, bypassing the command protocol
    pub fn load(&self, start: usize, bytes: &[u8]) {
        self.state().memory[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

pub struct SimPin {
    line: Line,
    state: Rc<RefCell<ChipState>>,
}

impl SimPin {
    fn check(&self, state: &ChipState) -> Result<(), SimError> {
        match state.broken {
            Some(line) if line == self.line => Err(SimError),
            _ => Ok(()),
        }
    }

    fn data_index(&self) -> usize {
        match self.line {
            Line::Data(i) => i,
            other => panic!("{:?} is not a data line", other),
        }
    }
}

impl ErrorType for SimPin {
    type Error = SimError;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        self.check(&state)?;
        state.set_level(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        self.check(&state)?;
        state.set_level(self.line, true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let state = self.state.borrow();
        self.check(&state)?;
        Ok(state.sample(self.data_index()))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl DataPin for SimPin {
    fn set_as_input_pull_down(&mut self) -> Result<(), Self::Error> {
        let i = self.data_index();
        let mut state = self.state.borrow_mut();
        self.check(&state)?;
        state.set_direction(i, false);
        Ok(())
    }

    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        let i = self.data_index();
        let mut state = self.state.borrow_mut();
        self.check(&state)?;
        state.set_direction(i, true);
        Ok(())
    }
}

/// Advances the simulated clock instead of sleeping
pub struct SimDelay(Rc<RefCell<ChipState>>);

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += ns as u64;
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += ns as u64;
    }
}

/// Keeps every screen the programmer pushed
#[derive(Debug, Default)]
pub struct Screen(pub Vec<Vec<String>>);

impl Screen {
    pub fn last(&self) -> &[String] {
        self.0.last().map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, line: &str) -> bool {
        self.0.iter().flatten().any(|l| l == line)
    }
}

impl ProgressSink for Screen {
    fn show(&mut self, lines: &[&str]) {
        assert!(lines.len() <= sst39sf::report::MAX_LINES);
        for line in lines {
            assert!(line.len() <= 21, "{:?} does not fit the display", line);
        }
        self.0.push(lines.iter().map(|l| l.to_string()).collect());
    }
}

/// A byte source that hands out `data` in chunks of `chunk` and then fails
pub struct FailingSource<'a> {
    pub data: &'a [u8],
    pub chunk: usize,
}

impl embedded_io::ErrorType for FailingSource<'_> {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for FailingSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.data.is_empty() {
            return Err(embedded_io::ErrorKind::Interrupted);
        }
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// A source that returns at most `chunk` bytes per read, for exercising short reads
pub struct Trickle<'a> {
    pub data: &'a [u8],
    pub chunk: usize,
}

impl embedded_io::ErrorType for Trickle<'_> {
    type Error = Infallible;
}

impl embedded_io::Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Deterministic test image
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + (i >> 8)) as u8).collect()
}
