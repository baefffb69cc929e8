//! Hardware glitch filter bookkeeping.
//!
//! Tracks every filter handle the registry allocated so teardown can
//! disable and free them.  Filters are only ever created on ports that
//! expose a [`GlitchFilterPort`]; everything else is handled by the caller.

use heapless::Vec;
use log::LevelFilter;

use crate::config::{GpioNum, MAX_GPIO_PINS};
use crate::error::HwError;
use crate::logging::vlog;
use crate::ports::{FilterHandle, GlitchFilterPort};

#[derive(Debug)]
pub struct GlitchFilterManager {
    handles: Vec<(GpioNum, FilterHandle), MAX_GPIO_PINS>,
    log_level: LevelFilter,
}

impl GlitchFilterManager {
    /// Release failures are logged at `log_level`.
    pub fn new(log_level: LevelFilter) -> Self {
        Self {
            handles: Vec::new(),
            log_level,
        }
    }

    /// Allocate and enable a filter for `gpio`.  A filter that allocates but
    /// fails to enable is still tracked so it gets freed at teardown.
    pub fn enable(&mut self, port: &dyn GlitchFilterPort, gpio: GpioNum) -> Result<(), HwError> {
        let handle = port.new_pin_filter(gpio)?;
        if self.handles.push((gpio, handle)).is_err() {
            // One filter per pin, so this only trips if a pin leaked a handle.
            release(port, handle, self.log_level);
            return Err(HwError::GlitchFilterFailed(-1));
        }
        port.enable(handle)
    }

    /// Disable and free the filter on `gpio`, if there is one.
    pub fn release(&mut self, port: &dyn GlitchFilterPort, gpio: GpioNum) {
        if let Some(idx) = self.handles.iter().position(|(g, _)| *g == gpio) {
            let (_, handle) = self.handles.swap_remove(idx);
            release(port, handle, self.log_level);
        }
    }

    /// Disable and free every tracked filter.
    pub fn release_all(&mut self, port: &dyn GlitchFilterPort) {
        for (_, handle) in self.handles.iter() {
            release(port, *handle, self.log_level);
        }
        self.handles.clear();
    }

    pub fn is_filtered(&self, gpio: GpioNum) -> bool {
        self.handles.iter().any(|(g, _)| *g == gpio)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn release(port: &dyn GlitchFilterPort, handle: FilterHandle, log_level: LevelFilter) {
    if let Err(e) = port.disable(handle) {
        vlog!(log_level, Warn, "Glitch filter disable failed: {}", e);
    }
    if let Err(e) = port.delete(handle) {
        vlog!(log_level, Warn, "Glitch filter delete failed: {}", e);
    }
}
