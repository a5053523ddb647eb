//! Programs an image into the simulated board from the test suite and prints
//! what a display on the real programmer would show.
//!
//! On hardware the flash comes from `Sst39sf040::new(pins, delay)` with the
//! HAL's pins, everything after that stays the same.

#[path = "../tests/common/mod.rs"]
mod common;

use std::convert::Infallible;

use common::Sim;
use sst39sf::{
    blocking::Sst39sf,
    report::ProgressSink,
    workflow::{Operation, Programmer},
    Timing,
};

/// A 4 KiB window keeps the simulated whole-chip passes short. A real part
/// uses one of the aliases, e.g. `Sst39sf040`.
const SIZE: u32 = 0x1000;

struct Console;

impl ProgressSink for Console {
    fn show(&mut self, lines: &[&str]) {
        println!("+---------------------+");
        for line in lines {
            println!("|{:<21}|", line);
        }
        println!("+---------------------+");
    }
}

fn main() {
    let sim = Sim::new();
    let mut flash =
        Sst39sf::<SIZE, _, _, _>::with_timing(sim.pins(), sim.delay(), Timing::DATASHEET).unwrap();

    let id = flash.read_product_id().unwrap();
    println!("Found {:?} ({:?})", id.chip(), id);

    let image = common::image(1000);
    let mut programmer = Programmer::new(flash, Console);

    let report = programmer
        .program_image(|| Ok::<_, Infallible>(image.as_slice()))
        .unwrap();
    println!("{:?}", report);
    assert!(report.is_clean());

    // A single pass, as picked from the serial console
    let key = b'r';
    if let Some(operation) = Operation::from_key(key) {
        let outcome = programmer.run(operation, image.as_slice()).unwrap();
        println!("'{}' -> {:?}", key as char, outcome);
    }

    let state = sim.state();
    println!(
        "{} bytes programmed, {} chip erases, {} bus contention events",
        state.programs, state.erases, state.contention
    );
}
