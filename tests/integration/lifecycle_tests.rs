//! Construction, inert registries, the process-wide ISR service, and
//! teardown ordering.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::PinState;
use irqmux::adapters::sim_gpio::SimGpio;
use irqmux::isr::{IsrContext, isr_service_installed};
use irqmux::ports::{GlitchFilterPort, GpioPort};
use irqmux::{ActiveLevel, Config, Error, GpioNum, HwError, InterruptConfig, InterruptRegistry};
use log::LevelFilter;

use crate::harness::{Gate, QUIET, WAIT, expect_event, recorder, registry, toggle};

/// [`SimGpio`] that raises a flag once the last handle to it is dropped.
struct TrackedPort {
    sim: SimGpio,
    dropped: Arc<AtomicBool>,
}

impl Drop for TrackedPort {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl GpioPort for TrackedPort {
    fn install_isr_service(&self) -> Result<(), HwError> {
        self.sim.install_isr_service()
    }

    fn configure_input(&self, interrupt: &InterruptConfig) -> Result<(), HwError> {
        self.sim.configure_input(interrupt)
    }

    fn add_isr_handler(&self, gpio: GpioNum, ctx: Arc<IsrContext>) -> Result<(), HwError> {
        self.sim.add_isr_handler(gpio, ctx)
    }

    fn remove_isr_handler(&self, gpio: GpioNum) -> Result<(), HwError> {
        self.sim.remove_isr_handler(gpio)
    }

    fn get_level(&self, gpio: GpioNum) -> PinState {
        self.sim.get_level(gpio)
    }

    fn glitch_filter(&self) -> Option<&dyn GlitchFilterPort> {
        self.sim.glitch_filter()
    }
}

fn config(depth: usize, interrupts: Vec<InterruptConfig>) -> Config {
    Config {
        interrupts,
        event_queue_size: depth,
        log_level: LevelFilter::Debug,
        ..Config::default()
    }
}

#[test]
fn zero_depth_queue_leaves_registry_inert() {
    let sim = SimGpio::new();
    let reg = registry(
        &sim,
        0,
        vec![InterruptConfig::new(2, ActiveLevel::High).callback(|_| {})],
    );
    assert!(reg.is_inert());
    assert_eq!(sim.configure_calls(), 0);
    assert_eq!(sim.armed_count(), 0);

    let err = reg.add_interrupt(InterruptConfig::new(3, ActiveLevel::High).callback(|_| {}));
    assert_eq!(err, Err(Error::Inert));
    assert_eq!(sim.configure_calls(), 0);
    assert_eq!(reg.dropped_events(), 0);
}

#[test]
fn oversized_queue_leaves_registry_inert() {
    let sim = SimGpio::new();
    let reg = registry(&sim, irqmux::config::MAX_EVENT_QUEUE_DEPTH + 1, Vec::new());
    assert!(reg.is_inert());
    assert_eq!(
        reg.add_interrupt(InterruptConfig::new(3, ActiveLevel::High).callback(|_| {})),
        Err(Error::Inert)
    );
}

#[test]
fn try_new_reports_exhausted_queue() {
    let sim = SimGpio::new();
    let interrupts = vec![InterruptConfig::new(2, ActiveLevel::High).callback(|_| {})];
    let err = InterruptRegistry::try_new(sim.clone(), config(0, interrupts)).err();
    assert_eq!(err, Some(Error::ResourceExhausted("event queue")));
    assert_eq!(sim.configure_calls(), 0);
}

#[test]
fn try_new_arms_pins_when_resources_are_available() {
    let sim = SimGpio::new();
    let (cb, rx) = recorder();
    let interrupts = vec![InterruptConfig::new(2, ActiveLevel::High).callback(cb)];
    let reg = InterruptRegistry::try_new(sim.clone(), config(4, interrupts)).unwrap();
    assert!(!reg.is_inert());
    toggle(&sim, 2);
    assert_eq!(expect_event(&rx).gpio_num, 2);
}

#[test]
fn largest_queue_is_accepted() {
    let sim = SimGpio::new();
    let (cb, rx) = recorder();
    let reg = registry(
        &sim,
        irqmux::config::MAX_EVENT_QUEUE_DEPTH,
        vec![InterruptConfig::new(2, ActiveLevel::High).callback(cb)],
    );
    assert!(!reg.is_inert());
    toggle(&sim, 2);
    assert_eq!(expect_event(&rx).gpio_num, 2);
}

#[test]
fn isr_service_is_installed_once_per_process() {
    let sim_a = SimGpio::new();
    let sim_b = SimGpio::new();
    let _a = registry(&sim_a, 4, Vec::new());
    assert!(isr_service_installed());
    let _b = registry(&sim_b, 4, Vec::new());

    // Another test may have won the race, so `sim_a` may also read zero.
    assert!(sim_a.isr_service_installs() <= 1);
    assert_eq!(sim_b.isr_service_installs(), 0);
}

#[test]
fn drop_disarms_every_pin() {
    let sim = SimGpio::new();
    let reg = registry(
        &sim,
        4,
        vec![
            InterruptConfig::new(2, ActiveLevel::High).callback(|_| {}),
            InterruptConfig::new(3, ActiveLevel::Low)
                .glitch_filter(true)
                .callback(|_| {}),
        ],
    );
    assert_eq!(sim.armed_count(), 2);
    assert_eq!(sim.allocated_filters(), 1);

    drop(reg);
    assert_eq!(sim.armed_count(), 0);
    assert_eq!(sim.allocated_filters(), 0);
}

#[test]
fn no_callback_runs_after_drop_returns() {
    let sim = SimGpio::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let reg = registry(
        &sim,
        8,
        vec![InterruptConfig::new(5, ActiveLevel::High).callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })],
    );

    let stop = Arc::new(AtomicBool::new(false));
    let hammer = {
        let sim = sim.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                toggle(&sim, 5);
                thread::yield_now();
            }
        })
    };

    thread::sleep(QUIET);
    drop(reg);
    let after_drop = count.load(Ordering::SeqCst);
    thread::sleep(QUIET);
    stop.store(true, Ordering::Relaxed);
    hammer.join().unwrap();

    assert!(after_drop > 0);
    assert_eq!(count.load(Ordering::SeqCst), after_drop);
    assert!(!sim.is_armed(5));
}

#[test]
fn drop_waits_for_queued_events_when_queue_is_full() {
    let sim = SimGpio::new();
    let (gate_pin, gate) = Gate::new();
    let (cb, rx) = recorder();
    let reg = registry(
        &sim,
        1,
        vec![gate_pin, InterruptConfig::new(3, ActiveLevel::High).callback(cb)],
    );

    gate.close(&sim);
    assert!(toggle(&sim, 3));

    let dropper = thread::spawn(move || drop(reg));
    thread::sleep(QUIET);
    // Drop cannot return while the dispatch task is parked in a callback.
    assert!(!dropper.is_finished());

    gate.open();
    dropper.join().unwrap();
    assert_eq!(rx.try_recv().map(|event| event.gpio_num), Ok(3));
}

#[test]
fn registry_may_be_dropped_from_its_own_callback() {
    let sim = SimGpio::new();
    let slot: Arc<Mutex<Option<InterruptRegistry<SimGpio>>>> = Arc::new(Mutex::new(None));
    let (done_tx, done_rx) = mpsc::channel();

    let reg = {
        let slot = Arc::clone(&slot);
        registry(
            &sim,
            4,
            vec![InterruptConfig::new(2, ActiveLevel::High).callback(move |_| {
                let taken = slot.lock().unwrap().take();
                drop(taken);
                let _ = done_tx.send(());
            })],
        )
    };
    *slot.lock().unwrap() = Some(reg);

    toggle(&sim, 2);
    done_rx.recv_timeout(WAIT).unwrap();
    assert!(slot.lock().unwrap().is_none());
    assert_eq!(sim.armed_count(), 0);
}

#[test]
fn self_drop_with_full_queue_still_stops_the_task() {
    let sim = SimGpio::new();
    let port_dropped = Arc::new(AtomicBool::new(false));
    let slot: Arc<Mutex<Option<InterruptRegistry<TrackedPort>>>> = Arc::new(Mutex::new(None));

    let trigger = {
        let sim = sim.clone();
        let slot = Arc::clone(&slot);
        InterruptConfig::new(2, ActiveLevel::High).callback(move |_| {
            // Fill the single-slot queue, then tear down from inside.
            assert!(toggle(&sim, 3));
            assert!(toggle(&sim, 3));
            let taken = slot.lock().unwrap().take();
            drop(taken);
        })
    };
    let filler = InterruptConfig::new(3, ActiveLevel::High).callback(|_| {});
    let port = TrackedPort {
        sim: sim.clone(),
        dropped: Arc::clone(&port_dropped),
    };
    let reg = InterruptRegistry::new(port, config(1, vec![trigger, filler]));
    *slot.lock().unwrap() = Some(reg);

    toggle(&sim, 2);

    // The port is released only once the dispatch task has exited.
    let deadline = Instant::now() + WAIT;
    while !port_dropped.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "dispatch task never exited");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(slot.lock().unwrap().is_none());
    assert_eq!(sim.armed_count(), 0);
}
