/*!
    Per-stream submission endpoints.
*/

use std::sync::Weak;

use ffmpeg_types::{Packet, Rational};

use crate::container::{Container, OutputStream};
use crate::muxer::{Job, MuxerInner};

/**
    Describes how to interpret a submitted packet's timestamps.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketDescriptor {
    /// Timebase of the packet's PTS, DTS and duration.
    pub time_base: Rational,
}

/**
    A packet handed to a handler, along with its descriptor.
*/
#[derive(Clone, Debug)]
pub struct PacketPayload {
    pub packet: Packet,
    pub descriptor: PacketDescriptor,
}

impl PacketPayload {
    pub fn new(packet: Packet, time_base: Rational) -> Self {
        Self {
            packet,
            descriptor: PacketDescriptor { time_base },
        }
    }
}

/**
    Anything upstream stages can push packets into.
*/
pub trait PacketHandler: Send + Sync {
    fn handle_packet(&self, payload: PacketPayload);
}

/**
    Feeds one output stream of a [`Muxer`](crate::Muxer).

    Holds only a weak reference to the muxer: a handler never keeps the muxer
    alive, and submissions to a muxer that is gone are ignored.
*/
pub struct MuxerPacketHandler<C: Container> {
    muxer: Weak<MuxerInner<C>>,
    stream: OutputStream,
}

impl<C: Container> MuxerPacketHandler<C> {
    pub(crate) fn new(muxer: Weak<MuxerInner<C>>, stream: OutputStream) -> Self {
        Self { muxer, stream }
    }

    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    /**
        Queue a packet for this handler's stream.

        Blocks while the muxer is paused, and while its queue is full once it
        has started. Returns false if the packet was rejected because the
        muxer is finalizing or gone.
    */
    pub fn submit(&self, payload: PacketPayload) -> bool {
        let Some(muxer) = self.muxer.upgrade() else {
            return false;
        };

        muxer.pause.wait();

        let accepted = muxer.queue.add(Job {
            payload,
            stream: self.stream,
        });
        if accepted {
            muxer.stats.incoming_rate.add(1);
        }
        accepted
    }
}

impl<C: Container> PacketHandler for MuxerPacketHandler<C> {
    fn handle_packet(&self, payload: PacketPayload) {
        if !self.submit(payload) {
            tracing::trace!(stream_index = self.stream.index, "packet rejected");
        }
    }
}

impl<C: Container> Clone for MuxerPacketHandler<C> {
    fn clone(&self) -> Self {
        Self {
            muxer: Weak::clone(&self.muxer),
            stream: self.stream,
        }
    }
}

impl<C: Container> std::fmt::Debug for MuxerPacketHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxerPacketHandler")
            .field("stream", &self.stream)
            .field("attached", &(self.muxer.strong_count() > 0))
            .finish()
    }
}
