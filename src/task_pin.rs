//! Core-pinned thread spawning for the dispatch task.
//!
//! On ESP-IDF a `std` thread is a pthread backed by a FreeRTOS task, and
//! `esp_pthread_set_cfg()` decides the stack, priority, name and core of the
//! next thread the calling thread creates.  [`spawn_task`] sets that config
//! and spawns immediately after.  On non-ESP targets it falls back to a plain
//! named thread.

use core::ffi::CStr;
use std::io;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;

/// CPU core identifiers for the ESP32 dual-core parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, BLE, lwIP).
    Pro = 0,
    /// Core 1 (APP_CPU): application logic.
    App = 1,
}

/// The name as a Rust string.  Empty and non-UTF-8 names are rejected.
fn thread_name(name: &CStr) -> io::Result<&str> {
    match name.to_str() {
        Ok(s) if !s.is_empty() => Ok(s),
        Ok(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "empty task name")),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "task name is not UTF-8",
        )),
    }
}

/// Spawn a thread with the scheduling parameters in `task`.
///
/// Unlike a bare `std::thread::spawn`, creation failure (out of memory for
/// the stack, pthread config rejected) is returned instead of panicking.
#[cfg(target_os = "espidf")]
pub fn spawn_task(
    task: &TaskConfig,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let name = thread_name(task.name)?;

    // SAFETY: esp_pthread_set_cfg copies the config into thread-local
    // storage; `task.name` is a 'static C string.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = task
            .core
            .map_or(esp_idf_sys::tskNO_AFFINITY as i32, |c| c as i32);
        cfg.prio = task.priority as i32;
        cfg.stack_size = (task.stack_kb * 1024) as _;
        cfg.thread_name = task.name.as_ptr();
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    std::thread::Builder::new().name(name.into()).spawn(f)
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task(
    task: &TaskConfig,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let name = thread_name(task.name)?;

    // Host test threads need more headroom than the on-target task.
    let stack = (task.stack_kb * 1024).max(64 * 1024);
    std::thread::Builder::new()
        .name(name.into())
        .stack_size(stack)
        .spawn(f)
}
