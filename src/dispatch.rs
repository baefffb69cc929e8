//! Dispatch task, the only place user callbacks run.
//!
//! ```text
//!            receive()              lookup (lock held)        callback (lock released)
//! Running ──────────────▶ pin id ────────────────────▶ entry ────────────────────────▶ Running
//!    │
//!    └── sentinel ──▶ Stopped
//! ```
//!
//! The blocking receive is the task's only suspension point.  The matching
//! table entry is copied out (callback `Arc` + active level) before the lock
//! is released, so a callback may call
//! [`add_interrupt`](crate::registry::InterruptRegistry::add_interrupt)
//! without deadlocking and a slow callback never blocks registration.

use core::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use log::LevelFilter;

use crate::config::{Callback, Event, GpioNum};
use crate::logging::vlog;
use crate::ports::GpioPort;
use crate::queue::EventQueue;
use crate::registry::Table;

pub(crate) struct Dispatcher<P: GpioPort> {
    port: Arc<P>,
    table: Arc<Mutex<Table>>,
    queue: EventQueue,
    log_level: LevelFilter,
}

impl<P: GpioPort> Dispatcher<P> {
    pub(crate) fn new(
        port: Arc<P>,
        table: Arc<Mutex<Table>>,
        queue: EventQueue,
        log_level: LevelFilter,
    ) -> Self {
        Self {
            port,
            table,
            queue,
            log_level,
        }
    }

    /// Task body.  Returns once the shutdown sentinel has been received.
    pub(crate) fn run(self) {
        vlog!(self.log_level, Debug, "Dispatch task running");
        while self.dispatch_one().is_continue() {}
        vlog!(self.log_level, Debug, "Dispatch task stopped");
    }

    fn dispatch_one(&self) -> ControlFlow<()> {
        let event = self.queue.receive();
        if event.is_shutdown() {
            return ControlFlow::Break(());
        }
        let gpio = event.gpio();
        vlog!(self.log_level, Info, "Received interrupt for GPIO {}", gpio);

        let matched = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .interrupts
                .iter()
                .find(|interrupt| interrupt.gpio_num == gpio)
                .map(|interrupt| (interrupt.callback.clone(), interrupt.active_level))
        };

        let Some((callback, active_level)) = matched else {
            vlog!(self.log_level, Error, "No interrupt found for GPIO {}", gpio);
            return ControlFlow::Continue(());
        };
        let Some(callback) = callback else {
            vlog!(self.log_level, Error, "No callback registered for GPIO {}", gpio);
            return ControlFlow::Continue(());
        };

        let active = active_level.is_active(self.port.get_level(gpio));
        vlog!(
            self.log_level,
            Debug,
            "GPIO {} is {}",
            gpio,
            if active { "active" } else { "inactive" }
        );
        self.invoke(gpio, &callback, &Event { gpio_num: gpio, active });
        ControlFlow::Continue(())
    }

    fn invoke(&self, gpio: GpioNum, callback: &Callback, event: &Event) {
        // Teardown waits on this task to consume the sentinel, so it has to
        // outlive a panicking callback.
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            vlog!(self.log_level, Error, "Callback for GPIO {} panicked", gpio);
        }
    }
}
