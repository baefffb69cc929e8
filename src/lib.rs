//! GPIO interrupt demultiplexer.
//!
//! Bridges per-pin hardware interrupts into task-context callbacks:
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────┐
//! │  GPIO edge │──▶│ ISR bridge │──▶│ EventQueue │──▶│ Dispatch task │──▶│ callback │
//! │ (hardware) │   │ (per pin)  │   │ (bounded)  │   │ (one thread)  │   │  (user)  │
//! └────────────┘   └────────────┘   └────────────┘   └───────────────┘   └──────────┘
//! ```
//!
//! The interrupt side never blocks, logs, or allocates.  Anything that may
//! block runs on the dispatch task, the user callback included.  Hardware
//! access goes through [`ports::GpioPort`].  ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` and a simulated port backs host builds
//! and tests.

#![deny(unused_must_use)]

#[cfg(all(target_os = "espidf", not(feature = "espidf")))]
compile_error!("ESP-IDF builds require the `espidf` feature");

mod logging;

pub mod adapters;
pub mod config;
mod dispatch;
pub mod error;
pub mod glitch_filter;
pub mod isr;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod task_pin;

pub use config::{
    ActiveLevel, Callback, Config, Event, GpioNum, InterruptConfig, TaskConfig, TriggerType,
};
pub use error::{Error, HwError};
pub use registry::InterruptRegistry;
