fn main() {
    // Link arguments for the ESP-IDF toolchain; host builds need none.
    #[cfg(feature = "esp32")]
    embuild::espidf::sysenv::output();
}
