//! Bounded ISR → task event queue.
//!
//! ```text
//! ┌─────────────┐  EventData  ┌──────────────┐  receive()  ┌───────────────┐
//! │ ISR bridge  │────────────▶│  EventQueue  │────────────▶│ Dispatch task │
//! │ (per pin)   │ send_from_  │  (fixed cap) │  (blocks)   │  (consumer)   │
//! └─────────────┘    isr()    └──────────────┘             └───────────────┘
//! ```
//!
//! The producer side never blocks and never allocates: a full queue drops the
//! event and bumps a counter.  Capacity is fixed when the queue is created.
//! Producers see `depth` slots; the backing store has one more, reserved for
//! the shutdown sentinel, so teardown can always post it.
//!
//! On ESP-IDF the queue is a FreeRTOS queue (`xQueueSendFromISR` on the
//! interrupt path).  On the host it is an `embassy-sync` channel guarded by
//! `critical-section`, which is what the simulated ISR path exercises.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::{GpioNum, MAX_EVENT_QUEUE_DEPTH};

/// Reserved pin id that tells the dispatch task to stop.
const SHUTDOWN_SENTINEL: GpioNum = -1;

/// Backing slots: the largest producer depth plus the sentinel slot.
#[cfg(not(target_os = "espidf"))]
const QUEUE_SLOTS: usize = MAX_EVENT_QUEUE_DEPTH + 1;

/// One queued interrupt: just the pin id, or the shutdown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct EventData(GpioNum);

impl EventData {
    pub const fn pin(gpio: GpioNum) -> Self {
        Self(gpio)
    }

    pub const fn shutdown() -> Self {
        Self(SHUTDOWN_SENTINEL)
    }

    pub const fn is_shutdown(self) -> bool {
        self.0 == SHUTDOWN_SENTINEL
    }

    pub const fn gpio(self) -> GpioNum {
        self.0
    }
}

/// Cloneable handle to a fixed-capacity event queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    /// Create a queue holding up to `depth` events.  Returns `None` when
    /// `depth` is zero, above [`MAX_EVENT_QUEUE_DEPTH`], or the backing
    /// storage cannot be allocated.
    pub fn new(depth: usize) -> Option<Self> {
        if depth == 0 || depth > MAX_EVENT_QUEUE_DEPTH {
            return None;
        }
        Inner::new(depth).map(|inner| Self {
            inner: Arc::new(inner),
        })
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.inner.depth
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Interrupt-safe enqueue.  Never blocks; returns `false` and drops the
    /// event if the queue is full.
    pub fn send_from_isr(&self, event: EventData) -> bool {
        let sent = self.inner.try_push(event);
        if !sent {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Task-context enqueue that waits for space.  Only used for the
    /// shutdown sentinel, after every ISR handler has been removed, where the
    /// reserved slot means it does not wait in practice.
    pub fn send_blocking(&self, event: EventData) {
        self.inner.push_blocking(event);
    }

    /// Block until an event is available.
    pub fn receive(&self) -> EventData {
        self.inner.pop_blocking()
    }

    /// Non-blocking dequeue.
    pub fn try_receive(&self) -> Option<EventData> {
        self.inner.try_pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Host backend (embassy-sync channel) ───────────────────────

#[cfg(not(target_os = "espidf"))]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
#[cfg(not(target_os = "espidf"))]
use embassy_sync::channel::Channel;

#[cfg(not(target_os = "espidf"))]
struct Inner {
    channel: Channel<CriticalSectionRawMutex, EventData, QUEUE_SLOTS>,
    depth: usize,
    dropped: AtomicU32,
}

#[cfg(not(target_os = "espidf"))]
impl Inner {
    fn new(depth: usize) -> Option<Self> {
        Some(Self {
            channel: Channel::new(),
            depth,
            dropped: AtomicU32::new(0),
        })
    }

    fn try_push(&self, event: EventData) -> bool {
        // The depth check and the send form one critical section, so
        // concurrent producers cannot reach the sentinel slot.
        critical_section::with(|_| {
            self.channel.len() < self.depth && self.channel.try_send(event).is_ok()
        })
    }

    fn push_blocking(&self, event: EventData) {
        futures_lite::future::block_on(self.channel.send(event));
    }

    fn pop_blocking(&self) -> EventData {
        futures_lite::future::block_on(self.channel.receive())
    }

    fn try_pop(&self) -> Option<EventData> {
        self.channel.try_receive().ok()
    }

    fn len(&self) -> usize {
        self.channel.len()
    }
}

// ── ESP-IDF backend (FreeRTOS queue) ──────────────────────────

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// `queueQUEUE_TYPE_BASE` and `queueSEND_TO_BACK` are cast macros that
/// bindgen does not export.
#[cfg(target_os = "espidf")]
const QUEUE_TYPE_BASE: u8 = 0;
#[cfg(target_os = "espidf")]
const SEND_TO_BACK: BaseType_t = 0;
#[cfg(target_os = "espidf")]
const PORT_MAX_DELAY: TickType_t = TickType_t::MAX;

#[cfg(target_os = "espidf")]
struct Inner {
    handle: QueueHandle_t,
    depth: usize,
    dropped: AtomicU32,
}

// SAFETY: FreeRTOS queue handles may be used from any task or ISR; every
// access below goes through the kernel's own locking.
#[cfg(target_os = "espidf")]
unsafe impl Send for Inner {}
#[cfg(target_os = "espidf")]
unsafe impl Sync for Inner {}

#[cfg(target_os = "espidf")]
impl Inner {
    fn new(depth: usize) -> Option<Self> {
        // SAFETY: plain allocation call; a null handle means out of memory.
        let handle = unsafe {
            xQueueGenericCreate(
                (depth + 1) as _,
                core::mem::size_of::<EventData>() as _,
                QUEUE_TYPE_BASE,
            )
        };
        if handle.is_null() {
            return None;
        }
        Some(Self {
            handle,
            depth,
            dropped: AtomicU32::new(0),
        })
    }

    fn try_push(&self, event: EventData) -> bool {
        let item = (&raw const event).cast::<core::ffi::c_void>();
        // SAFETY: `item` points to a live EventData of the queue's item size;
        // FreeRTOS copies it before returning.  The FromISR variants are used
        // whenever we are in interrupt context.
        unsafe {
            if xPortInIsrContext() != 0 {
                if uxQueueMessagesWaitingFromISR(self.handle) as usize >= self.depth {
                    return false;
                }
                xQueueGenericSendFromISR(self.handle, item, core::ptr::null_mut(), SEND_TO_BACK)
                    != 0
            } else {
                if uxQueueMessagesWaiting(self.handle) as usize >= self.depth {
                    return false;
                }
                xQueueGenericSend(self.handle, item, 0, SEND_TO_BACK) != 0
            }
        }
    }

    fn push_blocking(&self, event: EventData) {
        let item = (&raw const event).cast::<core::ffi::c_void>();
        // SAFETY: task context only; see try_push for the item contract.
        unsafe { xQueueGenericSend(self.handle, item, PORT_MAX_DELAY, SEND_TO_BACK) };
    }

    fn pop_blocking(&self) -> EventData {
        loop {
            if let Some(event) = self.recv(PORT_MAX_DELAY) {
                return event;
            }
        }
    }

    fn try_pop(&self) -> Option<EventData> {
        self.recv(0)
    }

    fn recv(&self, ticks: TickType_t) -> Option<EventData> {
        let mut event = EventData::shutdown();
        // SAFETY: `event` is a valid, writable EventData of the item size.
        let ret = unsafe {
            xQueueReceive(self.handle, (&raw mut event).cast::<core::ffi::c_void>(), ticks)
        };
        (ret != 0).then_some(event)
    }

    fn len(&self) -> usize {
        // SAFETY: read-only query on a live queue.
        unsafe { uxQueueMessagesWaiting(self.handle) as usize }
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Inner {
    fn drop(&mut self) {
        // SAFETY: the last EventQueue clone is gone, so no ISR handler or
        // task can reach the handle any more.
        unsafe { vQueueDelete(self.handle) };
    }
}
