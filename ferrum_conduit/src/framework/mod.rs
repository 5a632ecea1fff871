pub mod cli;
pub mod dsl;
pub mod errors;
pub mod host;
pub mod runner;
pub mod setup_file;
