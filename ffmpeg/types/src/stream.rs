/*!
    Stream description types.
*/

use crate::{ChannelLayout, CodecId, PixelFormat, Rational, SampleFormat};

/**
    Description of a video stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoStreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// Frame rate (may be unavailable).
    pub frame_rate: Option<Rational>,
    /// Time base for timestamps.
    pub time_base: Rational,
    /// Codec used.
    pub codec_id: CodecId,
    /// Codec extradata (SPS/PPS for H.264, VPS/SPS/PPS for H.265, etc.).
    pub extradata: Option<Vec<u8>>,
    /// Bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
    /// Codec profile (codec-specific value).
    pub profile: Option<i32>,
    /// Codec level (codec-specific value).
    pub level: Option<i32>,
}

impl VideoStreamInfo {
    /**
        Minimal description of a video stream; optional fields are left unset.
    */
    pub fn new(codec_id: CodecId, width: u32, height: u32, time_base: Rational) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::default(),
            frame_rate: None,
            time_base,
            codec_id,
            extradata: None,
            bitrate: None,
            profile: None,
            level: None,
        }
    }

    /**
        Returns the frame rate as fps, if available.
    */
    pub fn fps(&self) -> Option<f64> {
        self.frame_rate.map(|r| r.to_f64())
    }
}

/**
    Description of an audio stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioStreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub channels: ChannelLayout,
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Time base for timestamps.
    pub time_base: Rational,
    /// Codec used.
    pub codec_id: CodecId,
    /// Codec extradata (AudioSpecificConfig for AAC, etc.).
    pub extradata: Option<Vec<u8>>,
    /// Bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
    /// Codec profile (codec-specific value).
    pub profile: Option<i32>,
}

impl AudioStreamInfo {
    /**
        Minimal description of an audio stream, timestamped in samples.
    */
    pub fn new(codec_id: CodecId, sample_rate: u32, channels: ChannelLayout) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::default(),
            time_base: Rational::new(1, sample_rate as i32),
            codec_id,
            extradata: None,
            bitrate: None,
            profile: None,
        }
    }

    /**
        Returns the number of channels.
    */
    pub fn channel_count(&self) -> u16 {
        self.channels.channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_stream_info_fps() {
        let mut info = VideoStreamInfo::new(CodecId::H264, 1920, 1080, Rational::new(1, 90000));
        assert_eq!(info.fps(), None);

        info.frame_rate = Some(Rational::new(30, 1));
        assert_eq!(info.fps(), Some(30.0));
    }

    #[test]
    fn audio_stream_info_defaults_to_sample_timebase() {
        let info = AudioStreamInfo::new(CodecId::Aac, 48000, ChannelLayout::Stereo);
        assert_eq!(info.time_base, Rational::new(1, 48000));
        assert_eq!(info.channel_count(), 2);
    }
}
