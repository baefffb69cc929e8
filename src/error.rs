//! Unified error types for the interrupt demultiplexer.
//!
//! Every fallible registry operation funnels into [`Error`].  All variants
//! are `Copy` so they can be logged and returned without allocation.
//! Nothing in this module is ever produced on the interrupt path; the ISR
//! bridge is failure-silent.

use core::fmt;

use crate::config::GpioNum;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The event queue or the dispatch task could not be created.
    /// The registry that hit this is permanently inert.
    ResourceExhausted(&'static str),
    /// The registry is inert and cannot arm further pins.
    Inert,
    /// An interrupt was registered without a callback.
    MissingCallback { gpio: GpioNum },
    /// GPIO number does not fit the 64-bit pin mask.
    InvalidGpio(GpioNum),
    /// A low-level register configuration call failed.
    Hardware(HwError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted(what) => write!(f, "resource exhausted: {what}"),
            Self::Inert => write!(f, "registry is inert"),
            Self::MissingCallback { gpio } => write!(f, "no callback provided for GPIO {gpio}"),
            Self::InvalidGpio(gpio) => write!(f, "invalid GPIO number {gpio}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware (port) errors
// ---------------------------------------------------------------------------

/// Errors reported by a [`GpioPort`](crate::ports::GpioPort).  The payload is
/// the raw `esp_err_t` on target, or an arbitrary code in simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrHandlerAddFailed(i32),
    IsrHandlerRemoveFailed(i32),
    GlitchFilterFailed(i32),
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrHandlerAddFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
            Self::IsrHandlerRemoveFailed(rc) => {
                write!(f, "GPIO ISR handler remove failed (rc={})", rc)
            }
            Self::GlitchFilterFailed(rc) => write!(f, "glitch filter call failed (rc={})", rc),
        }
    }
}

impl std::error::Error for Error {}

impl std::error::Error for HwError {}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
