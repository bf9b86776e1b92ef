/*!
    Shared types for the ffmpeg crate ecosystem.

    This crate defines the types that cross crate boundaries: packets,
    timebases and stream descriptions. It has no dependency on FFmpeg, so
    consumers can depend on it without pulling in FFmpeg bindings.
*/

mod codec;
mod format;
mod packet;
mod rational;
mod stream;

pub use codec::CodecId;
pub use format::{ChannelLayout, PixelFormat, SampleFormat};
pub use packet::Packet;
pub use rational::Rational;
pub use stream::{AudioStreamInfo, VideoStreamInfo};
