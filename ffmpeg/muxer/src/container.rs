/*!
    The container library the muxer writes through.

    A [`ContainerFactory`] allocates a [`Container`] for an output location.
    The container is the only thing that knows how to lay packets out; the
    muxer drives it through the open, header, packets, trailer, close
    sequence. Dropping a container frees it.
*/

use ffmpeg_types::{AudioStreamInfo, CodecId, Packet, Rational, VideoStreamInfo};

use crate::config::ContainerFormat;
use crate::error::{MuxError, NativeError};

/**
    Description of a stream to add to the output.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum StreamParams {
    Video(VideoStreamInfo),
    Audio(AudioStreamInfo),
}

impl StreamParams {
    pub fn time_base(&self) -> Rational {
        match self {
            Self::Video(info) => info.time_base,
            Self::Audio(info) => info.time_base,
        }
    }

    pub fn codec_id(&self) -> CodecId {
        match self {
            Self::Video(info) => info.codec_id,
            Self::Audio(info) => info.codec_id,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), MuxError> {
        let time_base = self.time_base();
        if !time_base.is_valid() {
            return Err(MuxError::InvalidConfig(format!(
                "stream timebase {time_base} is not usable"
            )));
        }

        let codec = self.codec_id();
        let matches = match self {
            Self::Video(_) => codec.is_video(),
            Self::Audio(_) => codec.is_audio(),
        };
        if !matches {
            return Err(MuxError::InvalidConfig(format!(
                "{codec:?} does not match the stream kind"
            )));
        }
        Ok(())
    }
}

/**
    A stream registered on the output: where packets go and in which timebase.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputStream {
    pub index: usize,
    pub time_base: Rational,
}

/**
    Allocates containers.
*/
pub trait ContainerFactory {
    type Container: Container;

    /**
        Allocate an output container. `format: None` guesses the format from `url`.
    */
    fn allocate(
        &self,
        format: Option<&ContainerFormat>,
        url: &str,
    ) -> Result<Self::Container, NativeError>;
}

/**
    An allocated output container.

    Packet timestamps handed to [`Container::write_interleaved`] are in the
    timebase the stream was registered with.
*/
pub trait Container: Send + 'static {
    fn url(&self) -> &str;

    /**
        Whether the format writes through an I/O stream that must be opened
        explicitly (file-based formats do, some network and device formats do not).
    */
    fn needs_io(&self) -> bool;

    fn open_io(&mut self) -> Result<(), NativeError>;

    /**
        Register a stream, returning its index.
    */
    fn add_stream(&mut self, params: &StreamParams) -> Result<usize, NativeError>;

    fn write_header(&mut self, options: &[(&'static str, String)]) -> Result<(), NativeError>;

    /**
        Write a packet; the library may buffer it to interleave streams by time.
    */
    fn write_interleaved(&mut self, packet: &Packet) -> Result<(), NativeError>;

    fn write_trailer(&mut self) -> Result<(), NativeError>;

    fn close_io(&mut self) -> Result<(), NativeError>;
}
