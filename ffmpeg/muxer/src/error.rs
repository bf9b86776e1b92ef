/*!
    Error types for the muxer.
*/

use std::fmt;

use ffmpeg_types::Rational;
use thiserror::Error;

/**
    A failed call into the container library, translated from its native status code.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message} (code {code})")]
pub struct NativeError {
    /// Name of the native operation that failed (e.g. `"avformat_write_header"`).
    pub operation: &'static str,
    /// Raw status code returned by the library.
    pub code: i32,
    /// Human-readable diagnostic.
    pub message: String,
}

impl NativeError {
    pub fn new(operation: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
        }
    }
}

/**
    Errors produced by the muxer and its components.
*/
#[derive(Debug, Clone, Error)]
pub enum MuxError {
    #[error("invalid muxer configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate output for {url}: {source}")]
    Allocate { url: String, source: NativeError },

    #[error("failed to open {url} for writing: {source}")]
    OpenIo { url: String, source: NativeError },

    #[error("failed to add stream: {0}")]
    AddStream(NativeError),

    #[error("streams cannot be added once the muxer has started")]
    AlreadyStarted,

    #[error("failed to write header: {0}")]
    HeaderWrite(NativeError),

    #[error("failed to write packet on stream {stream_index}: {source}")]
    PacketWrite {
        stream_index: usize,
        source: NativeError,
    },

    #[error("cannot rescale packet on stream {stream_index} from {from} to {to}")]
    Rescale {
        stream_index: usize,
        from: Rational,
        to: Rational,
    },

    #[error("failed to restamp packet on stream {stream_index}: {reason}")]
    Restamp { stream_index: usize, reason: String },

    #[error("muxer thread panicked: {0}")]
    Panicked(String),

    #[error("failed to write trailer: {0}")]
    TrailerWrite(NativeError),

    #[error("failed to close output: {0}")]
    IoClose(NativeError),

    #[error("{}", CleanupList(.0))]
    Cleanup(Vec<MuxError>),

    #[error("muxer is already finalized")]
    Finalized,

    #[error("failed to spawn muxer thread: {0}")]
    Spawn(String),
}

/**
    Broad category of a [`MuxError`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid location or format, reported synchronously at construction.
    Configuration,
    /// The output could not be opened for writing.
    IoOpen,
    /// Header write failed; fatal to the node.
    HeaderWrite,
    /// A single packet could not be written; the packet is dropped.
    PacketWrite,
    /// Trailer write failed during teardown.
    TrailerWrite,
    /// One or more cleanup actions failed.
    Cleanup,
    /// The call is not valid in the node's current state.
    Lifecycle,
}

impl MuxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::Allocate { .. } | Self::AddStream(_) => {
                ErrorKind::Configuration
            }
            Self::OpenIo { .. } => ErrorKind::IoOpen,
            Self::HeaderWrite(_) => ErrorKind::HeaderWrite,
            Self::PacketWrite { .. } | Self::Rescale { .. } | Self::Restamp { .. } => {
                ErrorKind::PacketWrite
            }
            Self::TrailerWrite(_) => ErrorKind::TrailerWrite,
            Self::IoClose(_) | Self::Cleanup(_) => ErrorKind::Cleanup,
            Self::AlreadyStarted | Self::Finalized | Self::Spawn(_) | Self::Panicked(_) => {
                ErrorKind::Lifecycle
            }
        }
    }
}

struct CleanupList<'a>(&'a [MuxError]);

impl fmt::Display for CleanupList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cleanup action(s) failed", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{error}")?;
        }
        Ok(())
    }
}
