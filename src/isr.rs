//! ISR bridge and the process-wide GPIO ISR service.
//!
//! Each armed pin gets one [`IsrContext`], allocated when the pin is
//! configured and registered with the port as the handler argument.  The
//! handler body is shared: it reads the pin id from its context and posts it
//! into the event queue.  It does not block, log, or allocate, and it cannot
//! fail; a full queue silently drops the event.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use log::LevelFilter;

use crate::config::GpioNum;
use crate::logging::vlog;
use crate::ports::GpioPort;
use crate::queue::{EventData, EventQueue};

/// Per-pin handler context.
pub struct IsrContext {
    gpio_num: GpioNum,
    queue: EventQueue,
}

impl IsrContext {
    pub(crate) fn new(gpio_num: GpioNum, queue: EventQueue) -> Self {
        Self { gpio_num, queue }
    }

    pub fn gpio_num(&self) -> GpioNum {
        self.gpio_num
    }

    /// Handler body.  Safe to call from interrupt context.
    #[inline]
    pub fn on_interrupt(&self) {
        let _ = self.queue.send_from_isr(EventData::pin(self.gpio_num));
    }
}

// ── ISR service ───────────────────────────────────────────────

/// One-shot installer for the per-pin ISR service.
pub(crate) struct IsrService {
    once: Once,
    installed: AtomicBool,
}

impl IsrService {
    pub(crate) const fn new() -> Self {
        Self {
            once: Once::new(),
            installed: AtomicBool::new(false),
        }
    }

    /// Install through `port` on the first call.  Later calls are no-ops; a
    /// failed install is logged and not retried.
    pub(crate) fn ensure(&self, port: &dyn GpioPort, log_level: LevelFilter) {
        self.once.call_once(|| match port.install_isr_service() {
            Ok(()) => {
                self.installed.store(true, Ordering::Release);
                vlog!(log_level, Info, "GPIO ISR service installed");
            }
            Err(e) => vlog!(log_level, Error, "GPIO ISR service install failed: {}", e),
        });
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }
}

/// Shared by every registry in the process.  Never uninstalled.
static ISR_SERVICE: IsrService = IsrService::new();

pub(crate) fn ensure_isr_service(port: &dyn GpioPort, log_level: LevelFilter) {
    ISR_SERVICE.ensure(port, log_level);
}

/// Whether the process-wide ISR service was installed successfully.
pub fn isr_service_installed() -> bool {
    ISR_SERVICE.is_installed()
}
