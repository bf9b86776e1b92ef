/*!
    Packet muxing for the ffmpeg crate ecosystem.

    This crate is the output end of a media pipeline. A [`Muxer`] owns one
    output container. Upstream stages push encoded packets through
    [`MuxerPacketHandler`]s, one per output stream, and a single consumer
    thread writes them into the container in submission order.

    ```ignore
    let muxer = Muxer::new(
        MuxerOptions::new("out.mp4").with_format(ContainerFormat::Mp4),
        &FfmpegFactory,
        Arc::new(TracingEventSink),
    )?;
    let video = muxer.new_packet_handler(muxer.add_stream(&video_params)?);
    muxer.start()?;
    video.submit(PacketPayload::new(packet, encoder_time_base));
    muxer.stop();
    muxer.wait();
    ```

    Container libraries plug in through [`ContainerFactory`] and
    [`Container`]. [`MemoryFactory`] records operations instead of writing
    bytes; the libavformat backend is behind the `ffmpeg` feature.
*/

mod closer;
mod config;
mod container;
mod error;
mod events;
mod handler;
mod memory;
mod muxer;
mod node;
mod queue;
mod restamp;
mod stats;

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

pub use closer::Closer;
pub use config::{ContainerFormat, DEFAULT_QUEUE_CAPACITY, MuxerOptions};
pub use container::{Container, ContainerFactory, OutputStream, StreamParams};
pub use error::{ErrorKind, MuxError, NativeError};
pub use events::{Event, EventKind, EventSink, TracingEventSink};
pub use handler::{MuxerPacketHandler, PacketDescriptor, PacketHandler, PacketPayload};
pub use memory::{MemoryContainer, MemoryFactory, MemoryLog, MemoryOp};
pub use muxer::{Muxer, MuxerState};
pub use node::NodeMetadata;
pub use queue::WorkQueue;
pub use restamp::{Monotonic, Restamper, StartFromZero};
pub use stats::{
    CounterRateStat, DurationPercentageStat, GaugeStat, Stat, StatMetadata, StatSample, Stater,
};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegContainer, FfmpegFactory};
