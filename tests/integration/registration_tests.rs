//! Dynamic registration, duplicate registration, glitch filters, and the
//! rejection paths of `add_interrupt`.

use std::sync::{Arc, Weak, mpsc};

use embedded_hal::digital::PinState;
use irqmux::adapters::sim_gpio::SimGpio;
use irqmux::{ActiveLevel, Error, HwError, InterruptConfig, InterruptRegistry, TriggerType};

use crate::harness::{expect_event, expect_none, forward, recorder, registry, toggle};

#[test]
fn pin_added_after_startup_is_dispatched() {
    let sim = SimGpio::new();
    let reg = registry(&sim, 4, Vec::new());
    assert!(reg.registered_gpios().is_empty());

    let (cb, rx) = recorder();
    reg.add_interrupt(InterruptConfig::new(5, ActiveLevel::High).callback(cb))
        .unwrap();
    assert!(sim.is_armed(5));

    sim.set_level(5, PinState::High);
    assert_eq!(expect_event(&rx).gpio_num, 5);
}

#[test]
fn duplicate_registration_replaces_previous_entry() {
    let sim = SimGpio::new();
    let (old_cb, old_rx) = recorder();
    let (new_cb, new_rx) = recorder();
    let reg = registry(
        &sim,
        4,
        vec![
            InterruptConfig::new(5, ActiveLevel::High)
                .trigger(TriggerType::RisingEdge)
                .glitch_filter(true)
                .callback(old_cb),
            InterruptConfig::new(6, ActiveLevel::High).callback(|_| {}),
        ],
    );
    assert_eq!(sim.filtered_pins(), vec![5]);

    reg.add_interrupt(
        InterruptConfig::new(5, ActiveLevel::Low)
            .trigger(TriggerType::FallingEdge)
            .callback(new_cb),
    )
    .unwrap();

    // One entry, same position, hardware per the latest call.
    assert_eq!(reg.registered_gpios(), vec![5, 6]);
    assert_eq!(sim.pin_config(5).unwrap().trigger, TriggerType::FallingEdge);
    assert_eq!(sim.allocated_filters(), 0);
    assert!(!reg.is_glitch_filtered(5));
    assert_eq!(sim.armed_count(), 2);

    assert!(!sim.set_level(5, PinState::High));
    assert!(sim.set_level(5, PinState::Low));
    let event = expect_event(&new_rx);
    assert_eq!(event.gpio_num, 5);
    assert!(event.active);
    expect_none(&old_rx);
}

#[test]
fn glitch_filter_enabled_on_capable_chip_and_released_on_drop() {
    let sim = SimGpio::new();
    let reg = registry(
        &sim,
        4,
        vec![
            InterruptConfig::new(4, ActiveLevel::Low)
                .glitch_filter(true)
                .callback(|_| {}),
            InterruptConfig::new(8, ActiveLevel::Low).callback(|_| {}),
        ],
    );
    assert_eq!(sim.filtered_pins(), vec![4]);
    assert!(reg.is_glitch_filtered(4));
    assert!(!reg.is_glitch_filtered(8));

    drop(reg);
    assert_eq!(sim.allocated_filters(), 0);
}

#[test]
fn glitch_filter_on_unsupported_chip_still_arms_pin() {
    let sim = SimGpio::without_glitch_filter();
    let (cb, rx) = recorder();
    let reg = registry(&sim, 4, Vec::new());

    reg.add_interrupt(
        InterruptConfig::new(4, ActiveLevel::High)
            .glitch_filter(true)
            .callback(cb),
    )
    .unwrap();
    assert!(sim.is_armed(4));
    assert!(!reg.is_glitch_filtered(4));

    sim.set_level(4, PinState::High);
    assert_eq!(expect_event(&rx).gpio_num, 4);
}

#[test]
fn missing_callback_is_rejected_before_hardware() {
    let sim = SimGpio::new();
    let reg = registry(&sim, 4, vec![InterruptConfig::new(2, ActiveLevel::High)]);
    assert!(reg.registered_gpios().is_empty());
    assert_eq!(sim.configure_calls(), 0);

    let err = reg.add_interrupt(InterruptConfig::new(8, ActiveLevel::High));
    assert_eq!(err, Err(Error::MissingCallback { gpio: 8 }));
    assert!(reg.registered_gpios().is_empty());
    assert!(!sim.is_armed(8));
}

#[test]
fn out_of_range_gpio_is_rejected() {
    let sim = SimGpio::new();
    let reg = registry(&sim, 4, Vec::new());
    let err = reg.add_interrupt(InterruptConfig::new(64, ActiveLevel::High).callback(|_| {}));
    assert_eq!(err, Err(Error::InvalidGpio(64)));
}

#[test]
fn hardware_failure_leaves_pin_unarmed_without_rollback() {
    let sim = SimGpio::new();
    sim.fail_configure(7);
    let (cb, rx) = recorder();
    let reg = registry(&sim, 4, Vec::new());

    let err = reg.add_interrupt(InterruptConfig::new(7, ActiveLevel::High).callback(cb));
    assert_eq!(err, Err(Error::Hardware(HwError::GpioConfigFailed(-1))));
    assert!(!sim.is_armed(7));
    assert_eq!(reg.registered_gpios(), vec![7]);

    assert!(!sim.set_level(7, PinState::High));
    expect_none(&rx);

    // Other pins are unaffected.
    let (ok_cb, ok_rx) = recorder();
    reg.add_interrupt(InterruptConfig::new(9, ActiveLevel::High).callback(ok_cb))
        .unwrap();
    toggle(&sim, 9);
    assert_eq!(expect_event(&ok_rx).gpio_num, 9);
}

#[test]
fn callback_may_register_another_pin() {
    let sim = SimGpio::new();
    let reg = Arc::new(registry(&sim, 4, Vec::new()));
    let (tx, rx) = mpsc::channel();
    let (result_tx, result_rx) = mpsc::channel();

    let weak: Weak<InterruptRegistry<SimGpio>> = Arc::downgrade(&reg);
    reg.add_interrupt(InterruptConfig::new(2, ActiveLevel::High).callback(move |_| {
        let Some(reg) = weak.upgrade() else {
            return;
        };
        let late = InterruptConfig::new(3, ActiveLevel::High).callback(forward(&tx));
        let _ = result_tx.send(reg.add_interrupt(late));
    }))
    .unwrap();

    toggle(&sim, 2);
    assert_eq!(result_rx.recv_timeout(crate::harness::WAIT).unwrap(), Ok(()));
    assert!(sim.is_armed(3));

    toggle(&sim, 3);
    assert_eq!(expect_event(&rx).gpio_num, 3);
}
