#![macro_use]
#![allow(unused_macros)]

// Forwards to `log` and/or `defmt`, whichever is enabled. With neither backend
// the arguments are still evaluated by reference so callers don't trip
// unused-variable lints.

macro_rules! log_trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($s $(, $x)*);

            #[cfg(feature = "defmt")]
            ::defmt::trace!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($(&$x),*);
        }
    };
}

macro_rules! log_debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($s $(, $x)*);

            #[cfg(feature = "defmt")]
            ::defmt::debug!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($(&$x),*);
        }
    };
}

macro_rules! log_info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::info!($s $(, $x)*);

            #[cfg(feature = "defmt")]
            ::defmt::info!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($(&$x),*);
        }
    };
}

macro_rules! log_warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($s $(, $x)*);

            #[cfg(feature = "defmt")]
            ::defmt::warn!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($(&$x),*);
        }
    };
}

macro_rules! log_error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::error!($s $(, $x)*);

            #[cfg(feature = "defmt")]
            ::defmt::error!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($(&$x),*);
        }
    };
}
