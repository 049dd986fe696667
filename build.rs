fn main() {
    // Device builds pull the ESP-IDF environment (linker args, sdkconfig)
    // through embuild; host builds have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
