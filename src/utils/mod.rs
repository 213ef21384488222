/// Time source abstraction (system and manually driven clocks).
pub mod clock;
/// TOML configuration loading, validation and tracing setup.
pub mod config;
