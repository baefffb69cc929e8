//! Interrupt registry: owns the pin table, the event queue, the dispatch
//! task, and the glitch filters.
//!
//! ```text
//! caller ──new()/add_interrupt()──▶ Table ◀──lookup── Dispatch task ──▶ callback
//!                 │                                        ▲
//!                 └─ configure ─▶ GpioPort ─ISR─▶ EventQueue┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. `new()` creates the queue (failure leaves the registry inert), installs
//!    the process-wide ISR service once, arms every configured pin, and
//!    starts the dispatch task.  `try_new()` does the same but reports a
//!    failed queue or task as [`Error::ResourceExhausted`].
//! 2. `add_interrupt()` arms further pins at any time without restarting
//!    the task.  Registering a pin that is already armed replaces the old
//!    registration in place: its handler, context, and glitch filter are
//!    released before the pin is re-armed.
//! 3. `Drop` removes every ISR handler under the table lock, then posts the
//!    shutdown sentinel into its reserved slot and joins the task.  Because
//!    handler removal comes first, the sentinel is the last thing ever
//!    queued; once drop returns no callback can run.  Glitch filters and
//!    handler contexts are released last.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::LevelFilter;

use crate::config::{Config, GpioNum, InterruptConfig};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::glitch_filter::GlitchFilterManager;
use crate::isr::{self, IsrContext};
use crate::logging::vlog;
use crate::ports::GpioPort;
use crate::queue::{EventData, EventQueue};
use crate::task_pin;

/// State shared between caller context and the dispatch task.
pub(crate) struct Table {
    /// Registration order; at most one entry per pin.
    pub(crate) interrupts: Vec<InterruptConfig>,
    /// One live handler context per armed pin.
    pub(crate) handler_args: Vec<Arc<IsrContext>>,
    pub(crate) glitch_filters: GlitchFilterManager,
}

impl Table {
    pub(crate) fn new(log_level: LevelFilter) -> Self {
        Self {
            interrupts: Vec::new(),
            handler_args: Vec::new(),
            glitch_filters: GlitchFilterManager::new(log_level),
        }
    }
}

/// GPIO interrupt demultiplexer.
pub struct InterruptRegistry<P: GpioPort> {
    port: Arc<P>,
    table: Arc<Mutex<Table>>,
    /// `None` when the registry is inert.
    queue: Option<EventQueue>,
    task: Option<JoinHandle<()>>,
    log_level: LevelFilter,
}

impl<P: GpioPort> InterruptRegistry<P> {
    /// Build the registry and arm `config.interrupts`.
    ///
    /// Never fails: if the queue or the dispatch task cannot be created the
    /// error is logged and the registry is returned inert (see
    /// [`is_inert`](Self::is_inert)).
    pub fn new(port: P, config: Config) -> Self {
        Self::start(port, config).0
    }

    /// Like [`new`](Self::new), but a registry that would be inert is
    /// released and reported as [`Error::ResourceExhausted`].
    pub fn try_new(port: P, config: Config) -> Result<Self> {
        let (registry, started) = Self::start(port, config);
        started.map(|()| registry)
    }

    fn start(port: P, config: Config) -> (Self, Result<()>) {
        let Config {
            interrupts,
            event_queue_size,
            task,
            log_level,
        } = config;

        let mut registry = Self {
            port: Arc::new(port),
            table: Arc::new(Mutex::new(Table::new(log_level))),
            queue: None,
            task: None,
            log_level,
        };

        let Some(queue) = EventQueue::new(event_queue_size) else {
            vlog!(
                log_level,
                Error,
                "Failed to create event queue (size={})",
                event_queue_size
            );
            return (registry, Err(Error::ResourceExhausted("event queue")));
        };

        isr::ensure_isr_service(registry.port.as_ref(), log_level);

        {
            let mut table = registry.lock_table();
            for interrupt in interrupts {
                // Failures are logged inside; the remaining pins still arm.
                let _ = registry.register(&mut table, &queue, interrupt);
            }
        }

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry.port),
            Arc::clone(&registry.table),
            queue.clone(),
            log_level,
        );
        vlog!(
            log_level,
            Info,
            "Starting dispatch task {:?} (pri={}, stack={}KB, core={:?})",
            task.name,
            task.priority,
            task.stack_kb,
            task.core
        );
        match task_pin::spawn_task(&task, move || dispatcher.run()) {
            Ok(handle) => {
                registry.task = Some(handle);
                registry.queue = Some(queue);
                (registry, Ok(()))
            }
            Err(e) => {
                vlog!(log_level, Error, "Failed to start dispatch task: {}", e);
                {
                    let mut table = registry.lock_table();
                    registry.disarm_all(&mut table);
                    table.interrupts.clear();
                }
                (registry, Err(Error::ResourceExhausted("dispatch task")))
            }
        }
    }

    /// Arm one more pin.  Callable from any thread, including from inside a
    /// callback.
    ///
    /// Rejected without touching hardware if the registry is inert, the
    /// callback is missing, or the GPIO number is out of range.  A hardware
    /// failure leaves the entry in the table with the pin possibly unarmed;
    /// partially applied configuration is not rolled back.
    pub fn add_interrupt(&self, interrupt: InterruptConfig) -> Result<()> {
        vlog!(self.log_level, Info, "Adding interrupt for GPIO {}", interrupt.gpio_num);
        let Some(queue) = &self.queue else {
            vlog!(
                self.log_level,
                Error,
                "Registry is inert, not adding interrupt for GPIO {}",
                interrupt.gpio_num
            );
            return Err(Error::Inert);
        };
        let mut table = self.lock_table();
        self.register(&mut table, queue, interrupt)
    }

    /// True when construction failed to create the queue or the task.
    pub fn is_inert(&self) -> bool {
        self.queue.is_none()
    }

    /// Events dropped on the interrupt path because the queue was full.
    pub fn dropped_events(&self) -> u32 {
        self.queue.as_ref().map_or(0, EventQueue::dropped)
    }

    /// Registered pins, in registration order.
    pub fn registered_gpios(&self) -> Vec<GpioNum> {
        self.lock_table()
            .interrupts
            .iter()
            .map(|interrupt| interrupt.gpio_num)
            .collect()
    }

    /// Whether a hardware glitch filter is active on `gpio`.
    pub fn is_glitch_filtered(&self, gpio: GpioNum) -> bool {
        self.lock_table().glitch_filters.is_filtered(gpio)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock_table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, record, and configure one interrupt.
    fn register(
        &self,
        table: &mut Table,
        queue: &EventQueue,
        interrupt: InterruptConfig,
    ) -> Result<()> {
        let gpio = interrupt.gpio_num;
        vlog!(self.log_level, Info, "Configuring interrupt for GPIO {}", gpio);
        vlog!(self.log_level, Debug, "Config: {}", interrupt);

        if let Err(e) = interrupt.validate() {
            vlog!(self.log_level, Error, "{}, not registering interrupt", e);
            return Err(e);
        }

        let slot = match table.interrupts.iter().position(|i| i.gpio_num == gpio) {
            Some(idx) => {
                vlog!(self.log_level, Warn, "GPIO {} already registered, replacing", gpio);
                self.disarm(table, gpio);
                table.interrupts[idx] = interrupt;
                idx
            }
            None => {
                table.interrupts.push(interrupt);
                table.interrupts.len() - 1
            }
        };
        let interrupt = table.interrupts[slot].clone();
        self.configure(table, queue, &interrupt)
    }

    /// Input mode, trigger, pulls, ISR handler, then the optional filter.
    fn configure(
        &self,
        table: &mut Table,
        queue: &EventQueue,
        interrupt: &InterruptConfig,
    ) -> Result<()> {
        let gpio = interrupt.gpio_num;

        if let Err(e) = self.port.configure_input(interrupt) {
            vlog!(self.log_level, Error, "Failed to configure GPIO {}: {}", gpio, e);
            return Err(e.into());
        }

        let ctx = Arc::new(IsrContext::new(gpio, queue.clone()));
        if let Err(e) = self.port.add_isr_handler(gpio, Arc::clone(&ctx)) {
            vlog!(
                self.log_level,
                Error,
                "Failed to add ISR handler for GPIO {}: {}",
                gpio,
                e
            );
            return Err(e.into());
        }
        table.handler_args.push(ctx);

        if interrupt.enable_pin_glitch_filter {
            match self.port.glitch_filter() {
                Some(filter) => {
                    vlog!(self.log_level, Info, "Enabling glitch filter for GPIO {}", gpio);
                    if let Err(e) = table.glitch_filters.enable(filter, gpio) {
                        vlog!(
                            self.log_level,
                            Error,
                            "Failed to enable glitch filter for GPIO {}: {}",
                            gpio,
                            e
                        );
                        return Err(e.into());
                    }
                }
                None => vlog!(self.log_level, Warn, "Glitch filter not supported on this chip"),
            }
        }
        Ok(())
    }

    /// Remove the handler on `gpio` and release its context and filter.
    fn disarm(&self, table: &mut Table, gpio: GpioNum) {
        if let Some(idx) = table.handler_args.iter().position(|ctx| ctx.gpio_num() == gpio) {
            if let Err(e) = self.port.remove_isr_handler(gpio) {
                vlog!(
                    self.log_level,
                    Warn,
                    "Failed to remove ISR handler for GPIO {}: {}",
                    gpio,
                    e
                );
            }
            table.handler_args.remove(idx);
        }
        if let Some(filter) = self.port.glitch_filter() {
            table.glitch_filters.release(filter, gpio);
        }
    }

    fn remove_handlers(&self, table: &Table) {
        for ctx in &table.handler_args {
            if let Err(e) = self.port.remove_isr_handler(ctx.gpio_num()) {
                vlog!(
                    self.log_level,
                    Warn,
                    "Failed to remove ISR handler for GPIO {}: {}",
                    ctx.gpio_num(),
                    e
                );
            }
        }
    }

    fn disarm_all(&self, table: &mut Table) {
        self.remove_handlers(table);
        table.handler_args.clear();
        if let Some(filter) = self.port.glitch_filter() {
            table.glitch_filters.release_all(filter);
        }
    }

    /// Post the sentinel and wait for the dispatch task to exit.
    fn stop_task(&mut self, queue: &EventQueue) {
        let Some(task) = self.task.take() else {
            return;
        };
        if task.thread().id() == std::thread::current().id() {
            // Dropped from inside a callback: the task exits after this
            // callback returns, but it cannot be joined from itself.  Handlers
            // are already removed, so nothing refills the queue and the
            // sentinel is the next event the task sees.
            let mut discarded = 0usize;
            while queue.try_receive().is_some() {
                discarded += 1;
            }
            if discarded > 0 {
                vlog!(
                    self.log_level,
                    Warn,
                    "Discarded {} queued events on teardown from a callback",
                    discarded
                );
            }
            queue.send_blocking(EventData::shutdown());
            return;
        }
        queue.send_blocking(EventData::shutdown());
        if task.join().is_err() {
            vlog!(self.log_level, Error, "Dispatch task terminated abnormally");
        }
    }
}

impl<P: GpioPort> Drop for InterruptRegistry<P> {
    fn drop(&mut self) {
        {
            let table = self.lock_table();
            self.remove_handlers(&table);
        }
        if let Some(queue) = self.queue.take() {
            self.stop_task(&queue);
        }
        let mut table = self.lock_table();
        if let Some(filter) = self.port.glitch_filter() {
            table.glitch_filters.release_all(filter);
        }
        table.handler_args.clear();
        table.interrupts.clear();
    }
}
