//! Registry and per-pin interrupt configuration.
//!
//! [`Config`] is consumed once by
//! [`InterruptRegistry::new`](crate::registry::InterruptRegistry::new) and is
//! immutable afterwards.  [`InterruptConfig`] describes a single armed pin and
//! can also be handed to
//! [`add_interrupt`](crate::registry::InterruptRegistry::add_interrupt) at any
//! time.

use core::ffi::CStr;
use core::fmt;
use std::sync::Arc;

use embedded_hal::digital::PinState;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task_pin::Core;

/// GPIO number, as used by `gpio_num_t`.
pub type GpioNum = i32;

/// Pins are addressed through a `u64` bit mask, so only 0..64 are valid.
pub const MAX_GPIO_PINS: usize = 64;

/// Upper bound for [`Config::event_queue_size`].
pub const MAX_EVENT_QUEUE_DEPTH: usize = 64;

/// Delivered to a pin's callback on every qualifying transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The GPIO that fired.
    pub gpio_num: GpioNum,
    /// Whether the sampled level matches the pin's [`ActiveLevel`].
    pub active: bool,
}

/// User callback.  Runs on the dispatch task, never in interrupt context.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

// ---------------------------------------------------------------------------
// Levels and trigger types
// ---------------------------------------------------------------------------

/// Polarity that counts as "active" for a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActiveLevel {
    Low = 0,
    High = 1,
}

impl ActiveLevel {
    /// True when `level` is this polarity.
    pub fn is_active(self, level: PinState) -> bool {
        PinState::from(self) == level
    }
}

impl From<ActiveLevel> for PinState {
    fn from(level: ActiveLevel) -> Self {
        match level {
            ActiveLevel::Low => PinState::Low,
            ActiveLevel::High => PinState::High,
        }
    }
}

impl fmt::Display for ActiveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Hardware condition that raises the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerType {
    #[default]
    AnyEdge,
    RisingEdge,
    FallingEdge,
    LowLevel,
    HighLevel,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyEdge => write!(f, "ANY_EDGE"),
            Self::RisingEdge => write!(f, "RISING_EDGE"),
            Self::FallingEdge => write!(f, "FALLING_EDGE"),
            Self::LowLevel => write!(f, "LOW_LEVEL"),
            Self::HighLevel => write!(f, "HIGH_LEVEL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-pin interrupt
// ---------------------------------------------------------------------------

/// One pin's interrupt registration.
#[derive(Clone)]
pub struct InterruptConfig {
    pub gpio_num: GpioNum,
    pub callback: Option<Callback>,
    pub active_level: ActiveLevel,
    pub interrupt_type: TriggerType,
    pub pullup_enabled: bool,
    pub pulldown_enabled: bool,
    /// Only honoured on chips with a pin glitch filter (-C and -S series).
    pub enable_pin_glitch_filter: bool,
}

impl InterruptConfig {
    /// Any-edge interrupt with no pulls and no glitch filter.  A callback
    /// must still be attached before the pin can be armed.
    pub fn new(gpio_num: GpioNum, active_level: ActiveLevel) -> Self {
        Self {
            gpio_num,
            callback: None,
            active_level,
            interrupt_type: TriggerType::AnyEdge,
            pullup_enabled: false,
            pulldown_enabled: false,
            enable_pin_glitch_filter: false,
        }
    }

    pub fn callback(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(f));
        self
    }

    pub fn trigger(mut self, interrupt_type: TriggerType) -> Self {
        self.interrupt_type = interrupt_type;
        self
    }

    pub fn pullup(mut self, enabled: bool) -> Self {
        self.pullup_enabled = enabled;
        self
    }

    pub fn pulldown(mut self, enabled: bool) -> Self {
        self.pulldown_enabled = enabled;
        self
    }

    pub fn glitch_filter(mut self, enabled: bool) -> Self {
        self.enable_pin_glitch_filter = enabled;
        self
    }

    /// Checks the fields that can be rejected before touching hardware.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.gpio_num < 0 || self.gpio_num as usize >= MAX_GPIO_PINS {
            return Err(Error::InvalidGpio(self.gpio_num));
        }
        if self.callback.is_none() {
            return Err(Error::MissingCallback { gpio: self.gpio_num });
        }
        Ok(())
    }
}

impl fmt::Debug for InterruptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptConfig")
            .field("gpio_num", &self.gpio_num)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("active_level", &self.active_level)
            .field("interrupt_type", &self.interrupt_type)
            .field("pullup_enabled", &self.pullup_enabled)
            .field("pulldown_enabled", &self.pulldown_enabled)
            .field("enable_pin_glitch_filter", &self.enable_pin_glitch_filter)
            .finish()
    }
}

impl fmt::Display for InterruptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InterruptConfig{{gpio_num={}, active_level={}, interrupt_type={}, \
             pullup_enabled={}, pulldown_enabled={}, enable_pin_glitch_filter={}}}",
            self.gpio_num,
            self.active_level,
            self.interrupt_type,
            self.pullup_enabled,
            self.pulldown_enabled,
            self.enable_pin_glitch_filter,
        )
    }
}

// ---------------------------------------------------------------------------
// Registry configuration
// ---------------------------------------------------------------------------

/// Scheduling parameters for the dispatch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Thread name, handed to the pthread config as a C string.
    pub name: &'static CStr,
    pub stack_kb: usize,
    pub priority: u8,
    /// `None` leaves the task unpinned.
    pub core: Option<Core>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: c"irq_dispatch",
            stack_kb: 4,
            priority: 5,
            core: None,
        }
    }
}

/// Construction-time configuration for an
/// [`InterruptRegistry`](crate::registry::InterruptRegistry).
#[derive(Debug, Clone)]
pub struct Config {
    /// Pins armed during construction, in registration order.
    pub interrupts: Vec<InterruptConfig>,
    /// Capacity of the ISR → task event queue (1..=[`MAX_EVENT_QUEUE_DEPTH`]).
    pub event_queue_size: usize,
    pub task: TaskConfig,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interrupts: Vec::new(),
            event_queue_size: 10,
            task: TaskConfig::default(),
            log_level: LevelFilter::Warn,
        }
    }
}
