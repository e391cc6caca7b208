//! Logging interface, contingent on the `defmt-03` feature
//!
//! Keep `defmt-03` off unless you have a defmt transport wired up; the
//! shims below compile to nothing without it.

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt-03")]
        ::defmt_03::debug!($($args)*)
    };
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt-03")]
        ::defmt_03::warn!($($args)*)
    };
}
