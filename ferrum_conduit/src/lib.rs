pub mod api;
pub mod config;
pub mod core;
pub mod framework;

#[cfg(test)]
#[path = "tests/tests.rs"]
mod tests;
