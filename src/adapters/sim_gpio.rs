//! Simulated GPIO peripheral for host builds and tests.
//!
//! Implements [`GpioPort`] entirely in memory.  Tests drive pin levels with
//! [`SimGpio::set_level`]; the simulator evaluates the pin's trigger type and,
//! if it qualifies, runs the registered ISR bridge on the calling thread the
//! way the interrupt controller would.  Configuration, handler registration,
//! and glitch filter state are all observable for assertions.
//!
//! Level-triggered pins fire once per `set_level` call that lands on the
//! trigger level, rather than continuously.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::PinState;

use crate::config::{GpioNum, InterruptConfig, TriggerType};
use crate::error::HwError;
use crate::isr::IsrContext;
use crate::ports::{FilterHandle, GlitchFilterPort, GpioPort};

/// Input configuration last applied to a simulated pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinConfig {
    pub trigger: TriggerType,
    pub pullup: bool,
    pub pulldown: bool,
}

#[derive(Default)]
struct SimPin {
    level: Option<PinState>,
    config: Option<SimPinConfig>,
    handler: Option<Arc<IsrContext>>,
}

#[derive(Default)]
struct SimState {
    pins: HashMap<GpioNum, SimPin>,
    isr_service_installs: u32,
    configure_calls: u32,
    fail_isr_service: bool,
    fail_configure: HashSet<GpioNum>,
}

/// Cloneable handle; clones share the same simulated peripheral.
#[derive(Clone)]
pub struct SimGpio {
    state: Arc<Mutex<SimState>>,
    glitch: Option<SimGlitchFilter>,
}

impl SimGpio {
    /// A chip with per-pin glitch filters.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            glitch: Some(SimGlitchFilter::default()),
        }
    }

    /// A chip without glitch filters.
    pub fn without_glitch_filter() -> Self {
        Self {
            state: Arc::default(),
            glitch: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive `gpio` to `level`.  Returns `true` if the pin's interrupt fired.
    pub fn set_level(&self, gpio: GpioNum, level: PinState) -> bool {
        let handler = {
            let mut state = self.lock();
            let pin = state.pins.entry(gpio).or_default();
            let previous = pin.level.unwrap_or(PinState::Low);
            pin.level = Some(level);
            match (pin.config, &pin.handler) {
                (Some(cfg), Some(handler)) if fires(cfg.trigger, previous, level) => {
                    Some(Arc::clone(handler))
                }
                _ => None,
            }
        };
        // Runs outside the simulator lock, like a real ISR preempting code
        // that holds no peripheral lock.
        match handler {
            Some(ctx) => {
                ctx.on_interrupt();
                true
            }
            None => false,
        }
    }

    pub fn level(&self, gpio: GpioNum) -> PinState {
        self.lock()
            .pins
            .get(&gpio)
            .and_then(|pin| pin.level)
            .unwrap_or(PinState::Low)
    }

    /// Make every future `install_isr_service` fail.
    pub fn fail_isr_service(&self) {
        self.lock().fail_isr_service = true;
    }

    /// Make every future `configure_input` for `gpio` fail.
    pub fn fail_configure(&self, gpio: GpioNum) {
        self.lock().fail_configure.insert(gpio);
    }

    pub fn pin_config(&self, gpio: GpioNum) -> Option<SimPinConfig> {
        self.lock().pins.get(&gpio).and_then(|pin| pin.config)
    }

    /// Whether an ISR handler is currently attached to `gpio`.
    pub fn is_armed(&self, gpio: GpioNum) -> bool {
        self.lock()
            .pins
            .get(&gpio)
            .is_some_and(|pin| pin.handler.is_some())
    }

    pub fn armed_count(&self) -> usize {
        self.lock()
            .pins
            .values()
            .filter(|pin| pin.handler.is_some())
            .count()
    }

    pub fn isr_service_installs(&self) -> u32 {
        self.lock().isr_service_installs
    }

    pub fn configure_calls(&self) -> u32 {
        self.lock().configure_calls
    }

    /// Pins with an allocated and enabled glitch filter, sorted.
    pub fn filtered_pins(&self) -> Vec<GpioNum> {
        self.glitch
            .as_ref()
            .map(SimGlitchFilter::enabled_pins)
            .unwrap_or_default()
    }

    /// Filters currently allocated, enabled or not.
    pub fn allocated_filters(&self) -> usize {
        self.glitch.as_ref().map_or(0, SimGlitchFilter::allocated)
    }
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

fn fires(trigger: TriggerType, previous: PinState, current: PinState) -> bool {
    match trigger {
        TriggerType::AnyEdge => previous != current,
        TriggerType::RisingEdge => previous == PinState::Low && current == PinState::High,
        TriggerType::FallingEdge => previous == PinState::High && current == PinState::Low,
        TriggerType::LowLevel => current == PinState::Low,
        TriggerType::HighLevel => current == PinState::High,
    }
}

impl GpioPort for SimGpio {
    fn install_isr_service(&self) -> Result<(), HwError> {
        let mut state = self.lock();
        state.isr_service_installs += 1;
        if state.fail_isr_service {
            return Err(HwError::IsrInstallFailed(-1));
        }
        Ok(())
    }

    fn configure_input(&self, interrupt: &InterruptConfig) -> Result<(), HwError> {
        let mut state = self.lock();
        state.configure_calls += 1;
        if state.fail_configure.contains(&interrupt.gpio_num) {
            return Err(HwError::GpioConfigFailed(-1));
        }
        let pin = state.pins.entry(interrupt.gpio_num).or_default();
        pin.config = Some(SimPinConfig {
            trigger: interrupt.interrupt_type,
            pullup: interrupt.pullup_enabled,
            pulldown: interrupt.pulldown_enabled,
        });
        // An undriven pin settles at its pull.
        if pin.level.is_none() {
            if interrupt.pullup_enabled {
                pin.level = Some(PinState::High);
            } else if interrupt.pulldown_enabled {
                pin.level = Some(PinState::Low);
            }
        }
        Ok(())
    }

    fn add_isr_handler(&self, gpio: GpioNum, ctx: Arc<IsrContext>) -> Result<(), HwError> {
        self.lock().pins.entry(gpio).or_default().handler = Some(ctx);
        Ok(())
    }

    fn remove_isr_handler(&self, gpio: GpioNum) -> Result<(), HwError> {
        if let Some(pin) = self.lock().pins.get_mut(&gpio) {
            pin.handler = None;
        }
        Ok(())
    }

    fn get_level(&self, gpio: GpioNum) -> PinState {
        self.level(gpio)
    }

    fn glitch_filter(&self) -> Option<&dyn GlitchFilterPort> {
        self.glitch.as_ref().map(|g| g as &dyn GlitchFilterPort)
    }
}

// ── Glitch filter ─────────────────────────────────────────────

#[derive(Default)]
struct FilterState {
    next_handle: usize,
    /// handle → (pin, enabled)
    filters: HashMap<usize, (GpioNum, bool)>,
}

#[derive(Clone, Default)]
pub struct SimGlitchFilter {
    state: Arc<Mutex<FilterState>>,
}

impl SimGlitchFilter {
    fn lock(&self) -> MutexGuard<'_, FilterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enabled_pins(&self) -> Vec<GpioNum> {
        let mut pins: Vec<GpioNum> = self
            .lock()
            .filters
            .values()
            .filter(|(_, enabled)| *enabled)
            .map(|(gpio, _)| *gpio)
            .collect();
        pins.sort_unstable();
        pins
    }

    fn allocated(&self) -> usize {
        self.lock().filters.len()
    }

    fn set_enabled(&self, handle: FilterHandle, enabled: bool) -> Result<(), HwError> {
        match self.lock().filters.get_mut(&handle.as_raw()) {
            Some(entry) => {
                entry.1 = enabled;
                Ok(())
            }
            None => Err(HwError::GlitchFilterFailed(-1)),
        }
    }
}

impl GlitchFilterPort for SimGlitchFilter {
    fn new_pin_filter(&self, gpio: GpioNum) -> Result<FilterHandle, HwError> {
        let mut state = self.lock();
        state.next_handle += 1;
        let raw = state.next_handle;
        state.filters.insert(raw, (gpio, false));
        Ok(FilterHandle::from_raw(raw))
    }

    fn enable(&self, handle: FilterHandle) -> Result<(), HwError> {
        self.set_enabled(handle, true)
    }

    fn disable(&self, handle: FilterHandle) -> Result<(), HwError> {
        self.set_enabled(handle, false)
    }

    fn delete(&self, handle: FilterHandle) -> Result<(), HwError> {
        self.lock()
            .filters
            .remove(&handle.as_raw())
            .map(|_| ())
            .ok_or(HwError::GlitchFilterFailed(-1))
    }
}
