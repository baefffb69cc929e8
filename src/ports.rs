//! Port traits: the boundary between the demultiplexer and the GPIO
//! peripheral.
//!
//! ```text
//!   EspGpio / SimGpio ──▶ GpioPort ──▶ InterruptRegistry
//!                         └─ glitch_filter() ──▶ GlitchFilterPort (optional)
//! ```
//!
//! The registry never touches registers directly.  The glitch filter is a
//! queried capability: ports on chips without one return `None` from
//! [`GpioPort::glitch_filter`] and the registry degrades to an unfiltered pin.

use std::sync::Arc;

use embedded_hal::digital::PinState;

use crate::config::{GpioNum, InterruptConfig};
use crate::error::HwError;
use crate::isr::IsrContext;

/// GPIO peripheral operations the registry consumes.
pub trait GpioPort: Send + Sync + 'static {
    /// Install the per-pin ISR dispatch service.  Called at most once per
    /// process, see [`isr_service_installed`](crate::isr::isr_service_installed).
    fn install_isr_service(&self) -> Result<(), HwError>;

    /// Put the pin in input mode with the requested pulls and trigger type.
    fn configure_input(&self, interrupt: &InterruptConfig) -> Result<(), HwError>;

    /// Attach `ctx` as the pin's interrupt handler.  The port keeps `ctx`
    /// alive until [`remove_isr_handler`](Self::remove_isr_handler) returns,
    /// and must call [`IsrContext::on_interrupt`] from interrupt context on
    /// every qualifying transition.
    fn add_isr_handler(&self, gpio: GpioNum, ctx: Arc<IsrContext>) -> Result<(), HwError>;

    /// Detach the pin's handler.  Once this returns the handler will not run
    /// again for `gpio`.
    fn remove_isr_handler(&self, gpio: GpioNum) -> Result<(), HwError>;

    /// Synchronous read of the pin's current level.
    fn get_level(&self, gpio: GpioNum) -> PinState;

    /// Hardware glitch filter, when the chip has one.
    fn glitch_filter(&self) -> Option<&dyn GlitchFilterPort>;
}

/// Opaque handle to an allocated hardware glitch filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterHandle(usize);

impl FilterHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

/// Per-pin glitch filter allocate/enable/disable/free.
pub trait GlitchFilterPort {
    fn new_pin_filter(&self, gpio: GpioNum) -> Result<FilterHandle, HwError>;
    fn enable(&self, handle: FilterHandle) -> Result<(), HwError>;
    fn disable(&self, handle: FilterHandle) -> Result<(), HwError>;
    fn delete(&self, handle: FilterHandle) -> Result<(), HwError>;
}
