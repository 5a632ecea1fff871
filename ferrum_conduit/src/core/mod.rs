pub mod driver;
pub mod job;
pub mod proxy;
pub mod registry;
pub mod task;
