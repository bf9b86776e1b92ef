/*!
    Encoded packet type.
*/

use crate::Rational;

/**
    An encoded, timestamped unit of media data.

    Timestamps are expressed in ticks of whatever timebase the holder of the
    packet associates with it; the packet itself does not carry one.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Presentation timestamp (None if unknown).
    pub pts: Option<i64>,
    /// Decode timestamp (None if unknown).
    pub dts: Option<i64>,
    /// Duration in ticks (0 if unknown).
    pub duration: i64,
    /// Index of the output stream this packet belongs to.
    pub stream_index: usize,
    /// Whether this packet starts a keyframe.
    pub is_keyframe: bool,
}

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /**
        Rescale PTS, DTS and duration in place.

        Returns false, leaving the packet untouched, if either timebase is invalid.
    */
    pub fn rescale_ts(&mut self, from: Rational, to: Rational) -> bool {
        if !from.is_valid() || !to.is_valid() {
            return false;
        }

        let rescale = |ts: i64| Rational::rescale(ts, from, to).unwrap_or(ts);
        self.pts = self.pts.map(rescale);
        self.dts = self.dts.map(rescale);
        self.duration = rescale(self.duration);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_all_timestamps() {
        let mut packet = Packet::new(vec![1, 2, 3])
            .with_pts(2000)
            .with_dts(1000)
            .with_duration(40);

        assert!(packet.rescale_ts(Rational::new(1, 1000), Rational::new(1, 90000)));
        assert_eq!(packet.pts, Some(180000));
        assert_eq!(packet.dts, Some(90000));
        assert_eq!(packet.duration, 3600);
    }

    #[test]
    fn rescale_keeps_missing_timestamps_missing() {
        let mut packet = Packet::new(vec![0]).with_pts(10);
        assert!(packet.rescale_ts(Rational::new(1, 10), Rational::new(1, 100)));
        assert_eq!(packet.pts, Some(100));
        assert_eq!(packet.dts, None);
    }

    #[test]
    fn rescale_refuses_invalid_timebase() {
        let mut packet = Packet::new(vec![0]).with_pts(10);
        assert!(!packet.rescale_ts(Rational::new(1, 0), Rational::new(1, 100)));
        assert_eq!(packet.pts, Some(10));
    }
}
