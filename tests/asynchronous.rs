mod common;

use std::convert::Infallible;

use common::{image, Line, Screen, Sim, SimDelay, SimPin, DEVICE_ID};
use embassy_futures::block_on;
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};
use sst39sf::{
    address::Address,
    asynchronous::{AsyncProgrammer, AsyncSst39sf},
    bus::BusMode,
    error::Error,
    id::Chip,
    workflow::{Operation, Outcome, Phase},
    Timing,
};

const SIZE: u32 = 0x1000;

type Flash = AsyncSst39sf<SIZE, SimPin, SimPin, SimDelay>;

fn flash(sim: &Sim) -> Flash {
    block_on(AsyncSst39sf::with_timing(
        sim.pins(),
        sim.delay(),
        Timing::DATASHEET,
    ))
    .unwrap()
}

/// An async byte source that fails once its data runs out
struct Broken<'a>(&'a [u8]);

impl embedded_io_async::ErrorType for Broken<'_> {
    type Error = embedded_io_async::ErrorKind;
}

impl embedded_io_async::Read for Broken<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.0.is_empty() {
            return Err(embedded_io_async::ErrorKind::BrokenPipe);
        }
        let n = buf.len().min(self.0.len());
        buf[..n].copy_from_slice(&self.0[..n]);
        self.0 = &self.0[n..];
        Ok(n)
    }
}

#[test]
fn write_and_read_bytes() {
    let sim = Sim::new();
    sim.state().memory.fill(0xFF);
    let mut flash = flash(&sim);

    block_on(async {
        flash.write_byte(Address(0x10), 0x3C).await.unwrap();
        assert_eq!(flash.read_byte(Address(0x10)).await.unwrap(), 0x3C);

        flash.write(Address(0x20), &[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 3];
        flash.read(Address(0x20), &mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
    });

    let state = sim.state();
    assert_eq!(state.contention, 0);
    assert_eq!(state.busy_violations, 0);
}

#[test]
fn erase_and_product_id() {
    let sim = Sim::new();
    let mut flash = flash(&sim);

    block_on(async {
        flash.erase_chip().await.unwrap();
        let id = flash.read_product_id().await.unwrap();
        assert_eq!(id.device.0, DEVICE_ID);
        assert_eq!(id.chip(), Some(Chip::Sst39sf040));
        assert_eq!(flash.read_byte(Address(0)).await.unwrap(), 0xFF);
    });

    assert_eq!(sim.state().erases, 1);
    assert!(!sim.state().id_mode);
}

#[test]
fn out_of_bounds() {
    let sim = Sim::new();
    let mut flash = flash(&sim);

    block_on(async {
        assert_eq!(
            flash.read_byte(Address(SIZE)).await,
            Err(Error::OutOfBounds)
        );
        assert_eq!(
            flash.write(Address(SIZE - 1), &[0, 0]).await,
            Err(Error::OutOfBounds)
        );
    });
}

#[test]
fn nor_flash_traits() {
    let sim = Sim::new();
    let mut flash = flash(&sim);

    block_on(async {
        assert_eq!(ReadNorFlash::capacity(&flash), SIZE as usize);
        NorFlash::erase(&mut flash, 0, SIZE).await.unwrap();
        NorFlash::write(&mut flash, 5, &[0xAB]).await.unwrap();
        let mut buf = [0u8; 2];
        ReadNorFlash::read(&mut flash, 5, &mut buf).await.unwrap();
        assert_eq!(buf, [0xAB, 0xFF]);
        assert_eq!(
            NorFlash::erase(&mut flash, 0, 16).await,
            Err(Error::NotAligned)
        );
        assert_eq!(
            NorFlash::erase(&mut flash, 0, 2 * SIZE).await,
            Err(Error::OutOfBounds)
        );
    });
}

#[test]
fn a_new_programmer_shows_ready() {
    let sim = Sim::new();
    let programmer = AsyncProgrammer::new(flash(&sim), Screen::default());

    assert_eq!(programmer.phase(), Phase::Idle);
    let (_, screen) = programmer.into_inner();
    assert_eq!(screen.last(), ["Ready"]);
}

#[test]
fn program_image() {
    let sim = Sim::new();
    let mut programmer = AsyncProgrammer::new(flash(&sim), Screen::default());
    let data = image(500);

    let report = block_on(programmer.program_image(|| Ok::<_, Infallible>(data.as_slice())))
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.erase.scanned, SIZE);
    assert_eq!(report.write.written, 500);
    assert_eq!(report.verify.scanned, 500);
    assert_eq!(programmer.phase(), Phase::Idle);
    assert_eq!(programmer.flash().mode(), BusMode::Idle);
    assert_eq!(&sim.state().memory[..500], data.as_slice());
}

#[test]
fn run_reports_mismatches() {
    let sim = Sim::new();
    let mut programmer = AsyncProgrammer::new(flash(&sim), Screen::default());
    let data = image(64);

    block_on(async {
        programmer
            .run(Operation::Erase, data.as_slice())
            .await
            .unwrap();
        programmer
            .run(Operation::Write, data.as_slice())
            .await
            .unwrap();
    });
    sim.state().stuck.insert(7, !data[7]);

    let outcome = block_on(programmer.run(Operation::VerifyWritten, data.as_slice())).unwrap();
    match outcome {
        Outcome::Verified(result) => {
            assert_eq!(result.mismatches, 1);
            assert_eq!(result.scanned, 64);
        }
        other => panic!("unexpected {:?}", other),
    }

    let (_, screen) = programmer.into_inner();
    assert!(screen.contains("Address: 0x00007"));
}

#[test]
fn source_errors_fail_the_pass() {
    let sim = Sim::new();
    let mut programmer = AsyncProgrammer::new(flash(&sim), Screen::default());
    let data = image(5);

    let err = block_on(programmer.verify_stream(Broken(&data))).unwrap_err();

    assert_eq!(
        err,
        Error::Source(embedded_io_async::ErrorKind::BrokenPipe)
    );
    assert_eq!(programmer.phase(), Phase::Failed);
    assert_eq!(programmer.flash().mode(), BusMode::Idle);
}

#[test]
fn read_after_a_failed_switch_to_write() {
    let sim = Sim::new();
    sim.state().memory.fill(0xA5);
    let mut flash = flash(&sim);

    block_on(async {
        assert_eq!(flash.read_byte(Address(0x10)).await.unwrap(), 0xA5);
        sim.state().broken = Some(Line::Data(3));
        assert!(flash.enter_write().await.is_err());
        assert_eq!(flash.mode(), BusMode::Unknown);
        sim.state().broken = None;

        assert_eq!(flash.read_byte(Address(0x10)).await.unwrap(), 0xA5);
    });
    assert_eq!(sim.state().contention, 0);
}
