/*!
    In-memory container backend.

    Records every operation instead of producing bytes. Useful for pipelines
    that only need to observe what would be muxed, and for exercising the
    muxer's lifecycle without FFmpeg. Individual operations can be made to
    fail.
*/

use std::sync::Arc;

use ffmpeg_types::Packet;
use parking_lot::Mutex;

use crate::config::ContainerFormat;
use crate::container::{Container, ContainerFactory, StreamParams};
use crate::error::NativeError;

const EIO: i32 = -5;
const EINVAL: i32 = -22;

/**
    An operation performed on a [`MemoryContainer`].
*/
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryOp {
    Allocate { url: String, format: Option<String> },
    OpenIo,
    AddStream(StreamParams),
    WriteHeader(Vec<(&'static str, String)>),
    WritePacket(Packet),
    WriteTrailer,
    CloseIo,
    Free,
    /// A call that returned an error.
    Failed(&'static str),
}

/**
    Shared, ordered record of container operations.
*/
#[derive(Clone, Debug, Default)]
pub struct MemoryLog {
    ops: Arc<Mutex<Vec<MemoryOp>>>,
}

impl MemoryLog {
    fn push(&self, op: MemoryOp) {
        self.ops.lock().push(op);
    }

    pub fn ops(&self) -> Vec<MemoryOp> {
        self.ops.lock().clone()
    }

    /**
        Packets that were written successfully, in write order.
    */
    pub fn packets(&self) -> Vec<Packet> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                MemoryOp::WritePacket(packet) => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&MemoryOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| matches(op)).count()
    }

    /**
        Position of the first operation matching `matches`.
    */
    pub fn position(&self, matches: impl Fn(&MemoryOp) -> bool) -> Option<usize> {
        self.ops.lock().iter().position(matches)
    }
}

type PacketFault = Arc<dyn Fn(&Packet) -> bool + Send + Sync>;

#[derive(Clone, Default)]
struct Faults {
    allocate: bool,
    open_io: bool,
    header: bool,
    packet: Option<PacketFault>,
    trailer: bool,
    close_io: bool,
}

/**
    Allocates [`MemoryContainer`]s that all record into the same [`MemoryLog`].
*/
#[derive(Clone)]
pub struct MemoryFactory {
    log: MemoryLog,
    needs_io: bool,
    faults: Faults,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self {
            log: MemoryLog::default(),
            needs_io: true,
            faults: Faults::default(),
        }
    }

    pub fn log(&self) -> MemoryLog {
        self.log.clone()
    }

    /**
        Behave like a format that does its own I/O.
    */
    pub fn without_io(mut self) -> Self {
        self.needs_io = false;
        self
    }

    pub fn fail_allocate(mut self) -> Self {
        self.faults.allocate = true;
        self
    }

    pub fn fail_open_io(mut self) -> Self {
        self.faults.open_io = true;
        self
    }

    pub fn fail_header(mut self) -> Self {
        self.faults.header = true;
        self
    }

    /**
        Fail writes of packets for which `fault` returns true.
    */
    pub fn fail_packets<F>(mut self, fault: F) -> Self
    where
        F: Fn(&Packet) -> bool + Send + Sync + 'static,
    {
        self.faults.packet = Some(Arc::new(fault));
        self
    }

    pub fn fail_trailer(mut self) -> Self {
        self.faults.trailer = true;
        self
    }

    pub fn fail_close_io(mut self) -> Self {
        self.faults.close_io = true;
        self
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerFactory for MemoryFactory {
    type Container = MemoryContainer;

    fn allocate(
        &self,
        format: Option<&ContainerFormat>,
        url: &str,
    ) -> Result<MemoryContainer, NativeError> {
        if self.faults.allocate {
            self.log.push(MemoryOp::Failed("allocate"));
            return Err(NativeError::new("allocate", EINVAL, "injected allocation failure"));
        }

        self.log.push(MemoryOp::Allocate {
            url: url.to_string(),
            format: format.map(|f| f.short_name().to_string()),
        });

        Ok(MemoryContainer {
            url: url.to_string(),
            log: self.log.clone(),
            faults: self.faults.clone(),
            needs_io: self.needs_io,
            io_open: false,
            streams: 0,
            header_written: false,
            trailer_written: false,
        })
    }
}

/**
    A container that records operations into a [`MemoryLog`].

    Enforces the same call order a real muxing library expects: packets and
    the trailer require a written header, nothing is written after the
    trailer, and I/O must be open for formats that need it.
*/
pub struct MemoryContainer {
    url: String,
    log: MemoryLog,
    faults: Faults,
    needs_io: bool,
    io_open: bool,
    streams: usize,
    header_written: bool,
    trailer_written: bool,
}

impl MemoryContainer {
    fn fail(&self, operation: &'static str, code: i32, message: &str) -> NativeError {
        self.log.push(MemoryOp::Failed(operation));
        NativeError::new(operation, code, message)
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), NativeError> {
        if self.needs_io && !self.io_open {
            return Err(self.fail(operation, EINVAL, "I/O is not open"));
        }
        if self.trailer_written {
            return Err(self.fail(operation, EINVAL, "trailer already written"));
        }
        Ok(())
    }
}

impl Container for MemoryContainer {
    fn url(&self) -> &str {
        &self.url
    }

    fn needs_io(&self) -> bool {
        self.needs_io
    }

    fn open_io(&mut self) -> Result<(), NativeError> {
        if self.faults.open_io {
            return Err(self.fail("open_io", EIO, "injected open failure"));
        }
        self.io_open = true;
        self.log.push(MemoryOp::OpenIo);
        Ok(())
    }

    fn add_stream(&mut self, params: &StreamParams) -> Result<usize, NativeError> {
        if self.header_written {
            return Err(self.fail("add_stream", EINVAL, "header already written"));
        }
        let index = self.streams;
        self.streams += 1;
        self.log.push(MemoryOp::AddStream(params.clone()));
        Ok(index)
    }

    fn write_header(&mut self, options: &[(&'static str, String)]) -> Result<(), NativeError> {
        self.check_writable("write_header")?;
        if self.faults.header {
            return Err(self.fail("write_header", EIO, "injected header failure"));
        }
        if self.header_written {
            return Err(self.fail("write_header", EINVAL, "header already written"));
        }
        self.header_written = true;
        self.log.push(MemoryOp::WriteHeader(options.to_vec()));
        Ok(())
    }

    fn write_interleaved(&mut self, packet: &Packet) -> Result<(), NativeError> {
        self.check_writable("write_interleaved")?;
        if !self.header_written {
            return Err(self.fail("write_interleaved", EINVAL, "header not written"));
        }
        if packet.stream_index >= self.streams {
            return Err(self.fail("write_interleaved", EINVAL, "unknown stream index"));
        }
        if let Some(fault) = &self.faults.packet {
            if fault(packet) {
                return Err(self.fail("write_interleaved", EIO, "injected packet failure"));
            }
        }
        self.log.push(MemoryOp::WritePacket(packet.clone()));
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), NativeError> {
        self.check_writable("write_trailer")?;
        if !self.header_written {
            return Err(self.fail("write_trailer", EINVAL, "header not written"));
        }
        // A failed trailer still finalizes the output.
        self.trailer_written = true;
        if self.faults.trailer {
            return Err(self.fail("write_trailer", EIO, "injected trailer failure"));
        }
        self.log.push(MemoryOp::WriteTrailer);
        Ok(())
    }

    fn close_io(&mut self) -> Result<(), NativeError> {
        if !self.io_open {
            return Ok(());
        }
        self.io_open = false;
        if self.faults.close_io {
            return Err(self.fail("close_io", EIO, "injected close failure"));
        }
        self.log.push(MemoryOp::CloseIo);
        Ok(())
    }
}

impl Drop for MemoryContainer {
    fn drop(&mut self) {
        self.log.push(MemoryOp::Free);
    }
}

impl std::fmt::Debug for MemoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContainer")
            .field("url", &self.url)
            .field("streams", &self.streams)
            .field("header_written", &self.header_written)
            .field("trailer_written", &self.trailer_written)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_types::{CodecId, Rational, VideoStreamInfo};

    use super::*;

    fn video() -> StreamParams {
        StreamParams::Video(VideoStreamInfo::new(
            CodecId::H264,
            1280,
            720,
            Rational::new(1, 90000),
        ))
    }

    #[test]
    fn records_full_lifecycle() {
        let factory = MemoryFactory::new();
        let log = factory.log();
        {
            let mut container = factory.allocate(Some(&ContainerFormat::Mp4), "out.mp4").unwrap();
            container.open_io().unwrap();
            assert_eq!(container.add_stream(&video()).unwrap(), 0);
            container.write_header(&[]).unwrap();
            container.write_interleaved(&Packet::new(vec![1])).unwrap();
            container.write_trailer().unwrap();
            container.close_io().unwrap();
        }

        let ops = log.ops();
        assert_eq!(
            ops[0],
            MemoryOp::Allocate {
                url: "out.mp4".into(),
                format: Some("mp4".into())
            }
        );
        assert_eq!(ops[1], MemoryOp::OpenIo);
        assert!(matches!(ops[4], MemoryOp::WritePacket(_)));
        assert_eq!(&ops[5..], &[MemoryOp::WriteTrailer, MemoryOp::CloseIo, MemoryOp::Free]);
    }

    #[test]
    fn rejects_packets_before_header() {
        let factory = MemoryFactory::new().without_io();
        let mut container = factory.allocate(None, "memory:").unwrap();
        container.add_stream(&video()).unwrap();

        let err = container.write_interleaved(&Packet::new(vec![1])).unwrap_err();
        assert_eq!(err.operation, "write_interleaved");
        assert!(factory.log().packets().is_empty());
    }

    #[test]
    fn requires_open_io_for_file_formats() {
        let factory = MemoryFactory::new();
        let mut container = factory.allocate(None, "out.mkv").unwrap();
        assert!(container.write_header(&[]).is_err());
    }

    #[test]
    fn injected_packet_fault() {
        let factory = MemoryFactory::new()
            .without_io()
            .fail_packets(|p| p.pts == Some(1));
        let mut container = factory.allocate(None, "memory:").unwrap();
        container.add_stream(&video()).unwrap();
        container.write_header(&[]).unwrap();

        assert!(container.write_interleaved(&Packet::new(vec![0]).with_pts(1)).is_err());
        assert!(container.write_interleaved(&Packet::new(vec![0]).with_pts(2)).is_ok());
        assert_eq!(factory.log().packets().len(), 1);
        assert_eq!(
            factory.log().count(|op| *op == MemoryOp::Failed("write_interleaved")),
            1
        );
    }
}
