/*!
    Codec identifiers.
*/

/**
    Codecs known to the ecosystem.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    H264,
    H265,
    Vp9,
    Av1,
    Aac,
    Opus,
    Mp3,
}

impl CodecId {
    /**
        Returns true for video codecs.
    */
    pub const fn is_video(self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Vp9 | Self::Av1)
    }

    /**
        Returns true for audio codecs.
    */
    pub const fn is_audio(self) -> bool {
        matches!(self, Self::Aac | Self::Opus | Self::Mp3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_media_kind() {
        assert!(CodecId::H264.is_video());
        assert!(!CodecId::H264.is_audio());
        assert!(CodecId::Opus.is_audio());
        assert!(!CodecId::Av1.is_audio());
    }
}
