fn main() {
    // Propagates the ESP-IDF kconfig as `esp_idf_*` cfgs, including
    // `esp_idf_soc_gpio_support_pin_glitch_filter` used by the GPIO adapter.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
