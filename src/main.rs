//! Demo firmware: a push-button and a reed switch dispatched through one
//! registry.
//!
//! ```text
//!  GPIO 16 (button, active-low, pull-up, falling edge, filtered) ─┐
//!                                                                  ├─▶ InterruptRegistry ─▶ log
//!  GPIO 10 (reed switch, any edge, pull-up, added later) ─────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use esp_idf_hal::gpio::Pin;
use esp_idf_hal::peripherals::Peripherals;
use log::{LevelFilter, info};

use irqmux::adapters::esp_gpio::EspGpio;
use irqmux::task_pin::Core;
use irqmux::{ActiveLevel, Config, InterruptConfig, InterruptRegistry, TaskConfig, TriggerType};

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("irqmux demo v{}", env!("CARGO_PKG_VERSION"));

    // Held for the lifetime of the demo so no other driver claims the pins.
    let peripherals = Peripherals::take()?;
    let button_pin = peripherals.pins.gpio16;
    let reed_pin = peripherals.pins.gpio10;

    let presses = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&presses);

    let button = InterruptConfig::new(button_pin.pin(), ActiveLevel::Low)
        .trigger(TriggerType::FallingEdge)
        .pullup(true)
        .glitch_filter(true)
        .callback(move |event| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            info!("button: gpio={} active={} presses={}", event.gpio_num, event.active, n);
        });

    let registry = InterruptRegistry::new(
        EspGpio::new(),
        Config {
            interrupts: vec![button],
            event_queue_size: 10,
            task: TaskConfig {
                name: c"irq_dispatch",
                stack_kb: 4,
                priority: 10,
                core: Some(Core::App),
            },
            log_level: LevelFilter::Info,
        },
    );
    if registry.is_inert() {
        anyhow::bail!("interrupt registry failed to start");
    }

    let reed = InterruptConfig::new(reed_pin.pin(), ActiveLevel::Low)
        .pullup(true)
        .callback(|event| {
            info!("lid {}", if event.active { "closed" } else { "open" });
        });
    registry.add_interrupt(reed)?;

    loop {
        std::thread::sleep(std::time::Duration::from_secs(10));
        info!(
            "presses={} dropped={}",
            presses.load(Ordering::Relaxed),
            registry.dropped_events()
        );
    }
}
