//! Burst buffer snapshot records, size encoding and rendering
//!
//! Backends write [`BurstBufferInfo`] records during `state_pack`; readers
//! decode the whole snapshot with [`BurstBufferInfoMsg::unpack`] and print it
//! with [`render_msg`].

pub mod record;
pub mod render;
pub mod size;

pub use record::{
    BbState, BurstBufferInfo, BurstBufferInfoMsg, ReservationInfo, MIN_PROTOCOL_VERSION,
    PROTOCOL_VERSION,
};
pub use render::{render_msg, render_record, render_reservation};
pub use size::{format_size, parse_size, INFINITE, NO_VAL, SIZE_IN_NODES};
