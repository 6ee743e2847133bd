//! Domain layer - job views and the backend port
//!
//! Backends implement [`ports::BurstBufferPlugin`]; the driver talks to them
//! only through that trait.

pub mod job;
pub mod ports;

pub use job::*;
pub use ports::*;
