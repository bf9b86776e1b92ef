/*!
    Pluggable timestamp adjustment applied after rescaling.
*/

use std::collections::HashMap;

use ffmpeg_types::Packet;
use parking_lot::Mutex;

use crate::error::MuxError;

/**
    Adjusts a packet's timestamps in place.

    Called on the muxer's consumer thread after the packet has been rescaled
    to its output stream's timebase and tagged with the stream index. A
    returned error drops the packet and is reported as a `restamp` event.
*/
pub trait Restamper: Send + Sync {
    fn restamp(&self, packet: &mut Packet) -> Result<(), MuxError>;
}

/**
    Shifts every stream so its first packet is stamped zero.
*/
#[derive(Debug, Default)]
pub struct StartFromZero {
    offsets: Mutex<HashMap<usize, i64>>,
}

impl StartFromZero {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Restamper for StartFromZero {
    fn restamp(&self, packet: &mut Packet) -> Result<(), MuxError> {
        let Some(first) = packet.dts.or(packet.pts) else {
            return Ok(());
        };

        let offset = *self
            .offsets
            .lock()
            .entry(packet.stream_index)
            .or_insert(first);

        packet.pts = packet.pts.map(|ts| ts.saturating_sub(offset));
        packet.dts = packet.dts.map(|ts| ts.saturating_sub(offset));
        Ok(())
    }
}

/**
    Keeps decode timestamps strictly increasing per stream.

    A DTS at or below the previous one is bumped one tick past it, and PTS is
    raised to at least the resulting DTS.
*/
#[derive(Debug, Default)]
pub struct Monotonic {
    last_dts: Mutex<HashMap<usize, i64>>,
}

impl Monotonic {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Restamper for Monotonic {
    fn restamp(&self, packet: &mut Packet) -> Result<(), MuxError> {
        let Some(dts) = packet.dts.or(packet.pts) else {
            return Ok(());
        };

        let mut last_dts = self.last_dts.lock();
        let dts = match last_dts.get(&packet.stream_index) {
            Some(&last) if dts <= last => {
                last.checked_add(1).ok_or_else(|| MuxError::Restamp {
                    stream_index: packet.stream_index,
                    reason: "decode timestamp overflow".into(),
                })?
            }
            _ => dts,
        };
        last_dts.insert(packet.stream_index, dts);

        if packet.dts.is_some() {
            packet.dts = Some(dts);
        }
        packet.pts = packet.pts.map(|pts| pts.max(dts));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(stream_index: usize, pts: i64, dts: i64) -> Packet {
        Packet {
            stream_index,
            ..Packet::new(vec![0]).with_pts(pts).with_dts(dts)
        }
    }

    #[test]
    fn start_from_zero_per_stream() {
        let restamper = StartFromZero::new();

        let mut a = packet(0, 9000, 6000);
        restamper.restamp(&mut a).unwrap();
        assert_eq!((a.pts, a.dts), (Some(3000), Some(0)));

        let mut b = packet(1, 500, 500);
        restamper.restamp(&mut b).unwrap();
        assert_eq!((b.pts, b.dts), (Some(0), Some(0)));

        let mut c = packet(0, 12000, 9000);
        restamper.restamp(&mut c).unwrap();
        assert_eq!((c.pts, c.dts), (Some(6000), Some(3000)));
    }

    #[test]
    fn start_from_zero_ignores_untimed_packets() {
        let restamper = StartFromZero::new();
        let mut untimed = Packet::new(vec![0]);
        restamper.restamp(&mut untimed).unwrap();
        assert_eq!(untimed.pts, None);

        let mut timed = packet(0, 100, 100);
        restamper.restamp(&mut timed).unwrap();
        assert_eq!(timed.dts, Some(0));
    }

    #[test]
    fn monotonic_bumps_regressions() {
        let restamper = Monotonic::new();

        let mut first = packet(0, 100, 100);
        restamper.restamp(&mut first).unwrap();
        assert_eq!(first.dts, Some(100));

        let mut regress = packet(0, 50, 50);
        restamper.restamp(&mut regress).unwrap();
        assert_eq!((regress.pts, regress.dts), (Some(101), Some(101)));

        let mut forward = packet(0, 300, 200);
        restamper.restamp(&mut forward).unwrap();
        assert_eq!((forward.pts, forward.dts), (Some(300), Some(200)));
    }

    #[test]
    fn monotonic_rejects_overflow() {
        let restamper = Monotonic::new();
        let mut last = packet(0, i64::MAX, i64::MAX);
        restamper.restamp(&mut last).unwrap();

        let mut next = packet(0, 0, 0);
        let err = restamper.restamp(&mut next).unwrap_err();
        assert!(matches!(err, MuxError::Restamp { stream_index: 0, .. }));
    }

    #[test]
    fn monotonic_tracks_streams_independently() {
        let restamper = Monotonic::new();
        let mut video = packet(0, 1000, 1000);
        restamper.restamp(&mut video).unwrap();

        let mut audio = packet(1, 10, 10);
        restamper.restamp(&mut audio).unwrap();
        assert_eq!(audio.dts, Some(10));
    }
}
