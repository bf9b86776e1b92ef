/*!
    Muxer configuration.
*/

use std::sync::Arc;
use std::time::Duration;

use crate::error::MuxError;
use crate::node::NodeMetadata;
use crate::restamp::Restamper;

/**
    Default number of packets the work queue holds once the muxer has started.
*/
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/**
    Output container format.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MPEG-4 Part 14.
    Mp4,
    /// Matroska / MKV.
    Matroska,
    /// MPEG transport stream.
    MpegTs,
    /// HLS playlist with MPEG-TS segments.
    Hls { segment_duration: Duration },
    /// Any other format, by its muxer short name.
    Named(String),
}

impl ContainerFormat {
    /**
        Short name of the muxer implementing this format.
    */
    pub fn short_name(&self) -> &str {
        match self {
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
            Self::MpegTs => "mpegts",
            Self::Hls { .. } => "hls",
            Self::Named(name) => name,
        }
    }

    /**
        Muxer options passed when the header is written.
    */
    pub fn muxer_options(&self, fast_start: bool) -> Vec<(&'static str, String)> {
        match self {
            Self::Mp4 if fast_start => vec![("movflags", "+faststart".to_string())],
            Self::Hls { segment_duration } => vec![
                ("hls_time", segment_duration.as_secs().max(1).to_string()),
                // Keep all segments in playlist
                ("hls_list_size", "0".to_string()),
                ("hls_segment_type", "mpegts".to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

/**
    Options for creating a [`Muxer`](crate::Muxer).
*/
#[derive(Clone)]
pub struct MuxerOptions {
    /// Output location (file path or URL).
    pub url: String,
    /// Container format; None guesses it from the URL.
    pub format: Option<ContainerFormat>,
    /// Node metadata; empty fields are filled in automatically.
    pub node: NodeMetadata,
    /// Optional restamping applied to every packet.
    pub restamper: Option<Arc<dyn Restamper>>,
    /// Packets the work queue holds once started before producers block.
    pub queue_capacity: usize,
    /// Move the MP4 index to the front of the file.
    pub fast_start: bool,
}

impl MuxerOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            node: NodeMetadata::default(),
            restamper: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fast_start: false,
        }
    }

    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_node(mut self, node: NodeMetadata) -> Self {
        self.node = node;
        self
    }

    pub fn with_restamper(mut self, restamper: Arc<dyn Restamper>) -> Self {
        self.restamper = Some(restamper);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_fast_start(mut self, fast_start: bool) -> Self {
        self.fast_start = fast_start;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), MuxError> {
        if self.url.trim().is_empty() {
            return Err(MuxError::InvalidConfig("output url is empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(MuxError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        if let Some(ContainerFormat::Named(name)) = &self.format {
            if name.trim().is_empty() {
                return Err(MuxError::InvalidConfig("format name is empty".into()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MuxerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxerOptions")
            .field("url", &self.url)
            .field("format", &self.format)
            .field("node", &self.node)
            .field("restamper", &self.restamper.is_some())
            .field("queue_capacity", &self.queue_capacity)
            .field("fast_start", &self.fast_start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(ContainerFormat::Mp4.short_name(), "mp4");
        assert_eq!(ContainerFormat::Named("flv".into()).short_name(), "flv");
    }

    #[test]
    fn mp4_fast_start_option() {
        assert_eq!(
            ContainerFormat::Mp4.muxer_options(true),
            vec![("movflags", "+faststart".to_string())]
        );
        assert!(ContainerFormat::Mp4.muxer_options(false).is_empty());
        assert!(ContainerFormat::Matroska.muxer_options(true).is_empty());
    }

    #[test]
    fn hls_options() {
        let hls = ContainerFormat::Hls {
            segment_duration: Duration::from_secs(4),
        };
        let opts = hls.muxer_options(false);
        assert!(opts.contains(&("hls_time", "4".to_string())));
        assert!(opts.contains(&("hls_list_size", "0".to_string())));
    }

    #[test]
    fn validation() {
        assert!(MuxerOptions::new("out.mp4").validate().is_ok());
        assert!(matches!(
            MuxerOptions::new("  ").validate(),
            Err(MuxError::InvalidConfig(_))
        ));
        assert!(matches!(
            MuxerOptions::new("out.mp4").with_queue_capacity(0).validate(),
            Err(MuxError::InvalidConfig(_))
        ));
        assert!(matches!(
            MuxerOptions::new("out")
                .with_format(ContainerFormat::Named(String::new()))
                .validate(),
            Err(MuxError::InvalidConfig(_))
        ));
    }
}
