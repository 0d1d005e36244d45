//! Wire layer for the Unity editor link
//!
//! This crate provides:
//! - Command/reply envelopes and the liveness token
//! - Greeting handshake that negotiates framed vs. legacy boundaries
//! - `FrameCodec` strategies for both boundary formats
//! - TCP connect helper

pub mod codec;
pub mod handshake;
pub mod protocol;
pub mod tcp;

pub use codec::{FrameCodec, FramedCodec, FramingMode, LegacyCodec, ReadLimits, Stream, codec_for};
pub use handshake::perform_handshake;
pub use protocol::{
    FRAMING_MARKER, PING_TOKEN, ReplyEnvelope, contains_pong, decode_reply, encode_command,
    interpret_reply,
};
