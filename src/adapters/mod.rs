//! Adapters: concrete implementations of the [`GpioPort`](crate::ports::GpioPort)
//! boundary.
//!
//! | Adapter     | Implements                        | Connects to                 |
//! |-------------|-----------------------------------|-----------------------------|
//! | `esp_gpio`  | GpioPort, GlitchFilterPort        | ESP-IDF GPIO driver + ISR   |
//! | `sim_gpio`  | GpioPort, GlitchFilterPort        | In-memory pins (host/tests) |

#[cfg(target_os = "espidf")]
pub mod esp_gpio;
#[cfg(not(target_os = "espidf"))]
pub mod sim_gpio;
