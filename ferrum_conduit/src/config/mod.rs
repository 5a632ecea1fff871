pub mod configuration;
pub mod host_config;
