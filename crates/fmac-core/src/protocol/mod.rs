//! Protocol module - wire format definitions for the NCP link.

pub mod constants;
pub mod frame;
pub mod registers;

pub use constants::*;
pub use frame::{
    DecodedFrame, FrameError, FrameHeader, decode_confirmation_status, decode_frame, encode_frame,
    is_indication, round_up_even,
};
pub use registers::{
    Register, cfg_hardware_revision, cfg_hardware_type, cfg_in_direct_access_mode,
    ctrl_frame_type, ctrl_is_ready, ctrl_next_frame_len,
};
