use crate::bus::BusMode;

/// All possible errors emitted by the driver
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<PinError> {
    /// A pin could not be driven, sampled or reconfigured
    Pin(PinError),

    /// The byte source failed while being read
    Source(embedded_io::ErrorKind),

    /// The data bus was used outside the mode the operation needs
    BusMode { expected: BusMode, actual: BusMode },

    /// Invalid value passed
    Value,

    /// Address out of bound
    OutOfBounds,

    /// Range not aligned to the erase unit
    NotAligned,
}

impl<E> Error<E> {
    pub(crate) fn source<S: embedded_io::Error>(err: S) -> Self {
        let kind = err.kind();
        log_error!("byte source failed: {:?}", kind);
        Error::Source(kind)
    }
}

mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

    impl<E> From<NorFlashErrorKind> for Error<E> {
        fn from(e: NorFlashErrorKind) -> Self {
            match e {
                NorFlashErrorKind::NotAligned => Error::NotAligned,
                NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
                _ => Error::Value,
            }
        }
    }

    impl<PinError> NorFlashError for Error<PinError>
    where
        PinError: Debug,
    {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
                Error::NotAligned => NorFlashErrorKind::NotAligned,
                Error::Value => NorFlashErrorKind::Other,
                Error::Pin(_) => NorFlashErrorKind::Other,
                Error::Source(_) => NorFlashErrorKind::Other,
                Error::BusMode { .. } => NorFlashErrorKind::Other,
            }
        }
    }
}
