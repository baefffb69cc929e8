//! ESP-IDF GPIO adapter.
//!
//! Implements [`GpioPort`] with raw ESP-IDF sys calls: `gpio_config`, the
//! per-pin ISR service (`gpio_install_isr_service` / `gpio_isr_handler_add`)
//! and `gpio_get_level`.  Chips with `SOC_GPIO_SUPPORT_PIN_GLITCH_FILTER`
//! (-C and -S series) also get the pin glitch filter driver.
//!
//! Handler contexts are passed to the ISR service as raw pointers.  The
//! adapter keeps the owning `Arc` in its own table until the handler has been
//! removed, so the pointer is valid whenever the ISR can run.

use core::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::PinState;
use esp_idf_svc::sys::*;

use crate::config::{GpioNum, InterruptConfig, TriggerType};
use crate::error::HwError;
use crate::isr::IsrContext;
use crate::ports::GlitchFilterPort;
#[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
use crate::ports::FilterHandle;
use crate::ports::GpioPort;

/// Shared ISR entry point for every armed pin.
unsafe extern "C" fn gpio_isr_trampoline(arg: *mut c_void) {
    // SAFETY: `arg` is `Arc::as_ptr` of a context held in `EspGpio::handlers`
    // until `gpio_isr_handler_remove` has returned for this pin.
    let ctx = unsafe { &*(arg as *const IsrContext) };
    ctx.on_interrupt();
}

fn intr_type(trigger: TriggerType) -> gpio_int_type_t {
    match trigger {
        TriggerType::AnyEdge => gpio_int_type_t_GPIO_INTR_ANYEDGE,
        TriggerType::RisingEdge => gpio_int_type_t_GPIO_INTR_POSEDGE,
        TriggerType::FallingEdge => gpio_int_type_t_GPIO_INTR_NEGEDGE,
        TriggerType::LowLevel => gpio_int_type_t_GPIO_INTR_LOW_LEVEL,
        TriggerType::HighLevel => gpio_int_type_t_GPIO_INTR_HIGH_LEVEL,
    }
}

pub struct EspGpio {
    handlers: Mutex<Vec<(GpioNum, Arc<IsrContext>)>>,
    #[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
    glitch: EspGlitchFilter,
}

impl Default for EspGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl EspGpio {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            #[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
            glitch: EspGlitchFilter,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<(GpioNum, Arc<IsrContext>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GpioPort for EspGpio {
    fn install_isr_service(&self) -> Result<(), HwError> {
        // SAFETY: ESP_ERR_INVALID_STATE means another component already
        // installed the service, which is fine.
        let ret = unsafe { gpio_install_isr_service(0) };
        if ret != ESP_OK as esp_err_t && ret != ESP_ERR_INVALID_STATE as esp_err_t {
            return Err(HwError::IsrInstallFailed(ret));
        }
        Ok(())
    }

    fn configure_input(&self, interrupt: &InterruptConfig) -> Result<(), HwError> {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << interrupt.gpio_num,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: if interrupt.pullup_enabled {
                gpio_pullup_t_GPIO_PULLUP_ENABLE
            } else {
                gpio_pullup_t_GPIO_PULLUP_DISABLE
            },
            pull_down_en: if interrupt.pulldown_enabled {
                gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
            } else {
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
            },
            intr_type: intr_type(interrupt.interrupt_type),
            ..Default::default()
        };
        // SAFETY: gpio_num was range-checked against the 64-bit mask.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::GpioConfigFailed(ret));
        }
        Ok(())
    }

    fn add_isr_handler(&self, gpio: GpioNum, ctx: Arc<IsrContext>) -> Result<(), HwError> {
        let arg = Arc::as_ptr(&ctx) as *mut c_void;
        let mut handlers = self.handlers();
        handlers.push((gpio, ctx));
        // SAFETY: the context behind `arg` is owned by `handlers` until
        // remove_isr_handler; the trampoline only reads it.
        let ret = unsafe { gpio_isr_handler_add(gpio, Some(gpio_isr_trampoline), arg) };
        if ret != ESP_OK as esp_err_t {
            handlers.pop();
            return Err(HwError::IsrHandlerAddFailed(ret));
        }
        Ok(())
    }

    fn remove_isr_handler(&self, gpio: GpioNum) -> Result<(), HwError> {
        // SAFETY: removing a handler is valid whether or not one is attached.
        let ret = unsafe { gpio_isr_handler_remove(gpio) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::IsrHandlerRemoveFailed(ret));
        }
        self.handlers().retain(|(g, _)| *g != gpio);
        Ok(())
    }

    fn get_level(&self, gpio: GpioNum) -> PinState {
        // SAFETY: gpio_get_level is a read-only register access on an
        // already-configured input pin.
        if unsafe { gpio_get_level(gpio) } != 0 {
            PinState::High
        } else {
            PinState::Low
        }
    }

    #[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
    fn glitch_filter(&self) -> Option<&dyn GlitchFilterPort> {
        Some(&self.glitch)
    }

    #[cfg(not(esp_idf_soc_gpio_support_pin_glitch_filter))]
    fn glitch_filter(&self) -> Option<&dyn GlitchFilterPort> {
        None
    }
}

// ── Pin glitch filter ─────────────────────────────────────────

#[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
struct EspGlitchFilter;

#[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
fn raw_handle(handle: FilterHandle) -> gpio_glitch_filter_handle_t {
    handle.as_raw() as gpio_glitch_filter_handle_t
}

#[cfg(esp_idf_soc_gpio_support_pin_glitch_filter)]
impl GlitchFilterPort for EspGlitchFilter {
    fn new_pin_filter(&self, gpio: GpioNum) -> Result<FilterHandle, HwError> {
        let cfg = gpio_pin_glitch_filter_config_t {
            gpio_num: gpio,
            ..Default::default()
        };
        let mut handle: gpio_glitch_filter_handle_t = core::ptr::null_mut();
        // SAFETY: `cfg` and `handle` are valid for the duration of the call.
        let ret = unsafe { gpio_new_pin_glitch_filter(&cfg, &mut handle) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::GlitchFilterFailed(ret));
        }
        Ok(FilterHandle::from_raw(handle as usize))
    }

    fn enable(&self, handle: FilterHandle) -> Result<(), HwError> {
        // SAFETY: handle came from gpio_new_pin_glitch_filter and is not yet deleted.
        let ret = unsafe { gpio_glitch_filter_enable(raw_handle(handle)) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::GlitchFilterFailed(ret));
        }
        Ok(())
    }

    fn disable(&self, handle: FilterHandle) -> Result<(), HwError> {
        // SAFETY: as in enable().
        let ret = unsafe { gpio_glitch_filter_disable(raw_handle(handle)) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::GlitchFilterFailed(ret));
        }
        Ok(())
    }

    fn delete(&self, handle: FilterHandle) -> Result<(), HwError> {
        // SAFETY: the manager forgets the handle after this call.
        let ret = unsafe { gpio_del_glitch_filter(raw_handle(handle)) };
        if ret != ESP_OK as esp_err_t {
            return Err(HwError::GlitchFilterFailed(ret));
        }
        Ok(())
    }
}
