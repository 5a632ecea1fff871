//! Traits implemented by user code and the stock implementations.
pub mod compare;
pub mod context;
pub mod input;
pub mod map;
pub mod partition;
pub mod reduce;
