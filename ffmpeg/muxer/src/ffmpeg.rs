/*!
    Container backend on libavformat.
*/

use std::ffi::{CStr, CString, c_char};
use std::ptr;

use ffmpeg_next::ffi;

use ffmpeg_types::{
    AudioStreamInfo, CodecId, Packet, PixelFormat, Rational, SampleFormat, VideoStreamInfo,
};

use crate::config::ContainerFormat;
use crate::container::{Container, ContainerFactory, StreamParams};
use crate::error::NativeError;

const EINVAL: i32 = -22;

/**
    Turn a negative libav return code into a [`NativeError`].
*/
fn check(ret: i32, operation: &'static str) -> Result<(), NativeError> {
    if ret >= 0 {
        return Ok(());
    }

    let mut buf = [0 as c_char; 256];
    // SAFETY: buf is a valid mutable buffer of known length.
    let message = unsafe {
        ffi::av_strerror(ret, buf.as_mut_ptr(), buf.len());
        CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
    };

    Err(NativeError::new(operation, ret, message))
}

fn to_cstring(operation: &'static str, s: &str) -> Result<CString, NativeError> {
    CString::new(s).map_err(|e| NativeError::new(operation, EINVAL, e.to_string()))
}

/**
    Allocates [`FfmpegContainer`]s.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegFactory;

impl ContainerFactory for FfmpegFactory {
    type Container = FfmpegContainer;

    fn allocate(
        &self,
        format: Option<&ContainerFormat>,
        url: &str,
    ) -> Result<FfmpegContainer, NativeError> {
        ffmpeg_next::init()
            .map_err(|e| NativeError::new("init", i32::from(e), e.to_string()))?;

        let c_url = to_cstring("allocate", url)?;
        let c_format = format
            .map(|f| to_cstring("allocate", f.short_name()))
            .transpose()?;

        let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null(),
                c_format.as_ref().map_or(ptr::null(), |f| f.as_ptr()),
                c_url.as_ptr(),
            )
        };
        check(ret, "allocate")?;
        if ctx.is_null() {
            return Err(NativeError::new("allocate", EINVAL, "no output context"));
        }

        let pkt = unsafe { ffi::av_packet_alloc() };
        if pkt.is_null() {
            unsafe { ffi::avformat_free_context(ctx) };
            return Err(NativeError::new("allocate", EINVAL, "failed to allocate packet"));
        }

        Ok(FfmpegContainer {
            url: url.to_string(),
            c_url,
            ctx,
            pkt,
            streams: Vec::new(),
            header_written: false,
        })
    }
}

struct StreamSlot {
    stream: *mut ffi::AVStream,
    /// Timebase packets arrive in.
    declared: Rational,
    /// Timebase the format settled on when the header was written.
    effective: Rational,
}

/**
    An `AVFormatContext` and the streams registered on it.
*/
pub struct FfmpegContainer {
    url: String,
    c_url: CString,
    ctx: *mut ffi::AVFormatContext,
    pkt: *mut ffi::AVPacket,
    streams: Vec<StreamSlot>,
    header_written: bool,
}

// SAFETY: the context is only ever used by one thread at a time; the muxer
// guards it with a mutex.
unsafe impl Send for FfmpegContainer {}

impl Container for FfmpegContainer {
    fn url(&self) -> &str {
        &self.url
    }

    fn needs_io(&self) -> bool {
        unsafe {
            let oformat = (*self.ctx).oformat;
            (*oformat).flags & ffi::AVFMT_NOFILE == 0
        }
    }

    fn open_io(&mut self) -> Result<(), NativeError> {
        let ret = unsafe {
            ffi::avio_open(
                &mut (*self.ctx).pb,
                self.c_url.as_ptr(),
                ffi::AVIO_FLAG_WRITE,
            )
        };
        check(ret, "open_io")
    }

    fn add_stream(&mut self, params: &StreamParams) -> Result<usize, NativeError> {
        let stream = unsafe { ffi::avformat_new_stream(self.ctx, ptr::null()) };
        if stream.is_null() {
            return Err(NativeError::new("add_stream", EINVAL, "failed to create stream"));
        }

        let time_base = params.time_base();
        unsafe {
            match params {
                StreamParams::Video(info) => set_video_parameters((*stream).codecpar, info)?,
                StreamParams::Audio(info) => set_audio_parameters((*stream).codecpar, info)?,
            }

            (*stream).time_base = ffi::AVRational {
                num: time_base.num,
                den: time_base.den,
            };
            if let StreamParams::Video(VideoStreamInfo {
                frame_rate: Some(rate),
                ..
            }) = params
            {
                (*stream).avg_frame_rate = ffi::AVRational {
                    num: rate.num,
                    den: rate.den,
                };
            }
        }

        self.streams.push(StreamSlot {
            stream,
            declared: time_base,
            effective: time_base,
        });
        Ok(unsafe { (*stream).index as usize })
    }

    fn write_header(&mut self, options: &[(&'static str, String)]) -> Result<(), NativeError> {
        let mut dict: *mut ffi::AVDictionary = ptr::null_mut();
        for (key, value) in options {
            let key = to_cstring("write_header", key)?;
            let value = to_cstring("write_header", value)?;
            unsafe { ffi::av_dict_set(&mut dict, key.as_ptr(), value.as_ptr(), 0) };
        }

        let ret = unsafe { ffi::avformat_write_header(self.ctx, &mut dict) };
        unsafe {
            if !dict.is_null() && ffi::av_dict_count(dict) > 0 {
                tracing::warn!(url = %self.url, "some muxer options were not recognized");
            }
            ffi::av_dict_free(&mut dict);
        }
        check(ret, "write_header")?;

        // The format may have picked its own stream timebases
        for slot in &mut self.streams {
            let tb = unsafe { (*slot.stream).time_base };
            slot.effective = Rational::new(tb.num, tb.den);
            if slot.effective != slot.declared {
                tracing::debug!(
                    url = %self.url,
                    declared = %slot.declared,
                    effective = %slot.effective,
                    "stream timebase adjusted by format"
                );
            }
        }

        self.header_written = true;
        Ok(())
    }

    fn write_interleaved(&mut self, packet: &Packet) -> Result<(), NativeError> {
        self.to_av_packet(packet)?;
        // Takes ownership of the packet's payload and unrefs it
        let ret = unsafe { ffi::av_interleaved_write_frame(self.ctx, self.pkt) };
        check(ret, "write_interleaved")
    }

    fn write_trailer(&mut self) -> Result<(), NativeError> {
        let ret = unsafe { ffi::av_write_trailer(self.ctx) };
        check(ret, "write_trailer")
    }

    fn close_io(&mut self) -> Result<(), NativeError> {
        unsafe {
            if !(*self.ctx).pb.is_null() {
                let ret = ffi::avio_closep(&mut (*self.ctx).pb);
                check(ret, "close_io")?;
            }
        }
        Ok(())
    }
}

impl FfmpegContainer {
    /**
        Fill the reusable `AVPacket` from `packet`, converting its timestamps
        into the stream's effective timebase.
    */
    fn to_av_packet(&mut self, packet: &Packet) -> Result<(), NativeError> {
        let slot = self.streams.get(packet.stream_index).ok_or_else(|| {
            NativeError::new("write_interleaved", EINVAL, "unknown stream index")
        })?;
        let (pts, dts, duration) = packet_timestamps(packet, slot.declared, slot.effective)
            .ok_or_else(|| NativeError::new("write_interleaved", EINVAL, "invalid timebase"))?;
        let size = i32::try_from(packet.data.len())
            .map_err(|_| NativeError::new("write_interleaved", EINVAL, "packet too large"))?;
        let stream_index = i32::try_from(packet.stream_index)
            .map_err(|_| NativeError::new("write_interleaved", EINVAL, "stream index out of range"))?;

        unsafe {
            ffi::av_packet_unref(self.pkt);
            check(ffi::av_new_packet(self.pkt, size), "write_interleaved")?;
            if size > 0 {
                ptr::copy_nonoverlapping(packet.data.as_ptr(), (*self.pkt).data, packet.data.len());
            }

            (*self.pkt).pts = pts;
            (*self.pkt).dts = dts;
            (*self.pkt).duration = duration;
            (*self.pkt).stream_index = stream_index;
            if packet.is_keyframe {
                (*self.pkt).flags |= ffi::AV_PKT_FLAG_KEY;
            }
        }

        Ok(())
    }
}

/**
    PTS, DTS and duration rescaled from `declared` to `effective`, with
    missing timestamps mapped to `AV_NOPTS_VALUE`.
*/
fn packet_timestamps(
    packet: &Packet,
    declared: Rational,
    effective: Rational,
) -> Option<(i64, i64, i64)> {
    let rescale = |ts: Option<i64>| match ts {
        Some(ts) => Rational::rescale(ts, declared, effective),
        None => Some(ffi::AV_NOPTS_VALUE),
    };

    Some((
        rescale(packet.pts)?,
        rescale(packet.dts)?,
        Rational::rescale(packet.duration, declared, effective)?,
    ))
}

impl Drop for FfmpegContainer {
    fn drop(&mut self) {
        unsafe {
            ffi::av_packet_free(&mut self.pkt);
            if !(*self.ctx).pb.is_null() {
                ffi::avio_closep(&mut (*self.ctx).pb);
            }
            ffi::avformat_free_context(self.ctx);
            self.ctx = ptr::null_mut();
        }
        tracing::debug!(url = %self.url, "output context freed");
    }
}

impl std::fmt::Debug for FfmpegContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegContainer")
            .field("url", &self.url)
            .field("streams", &self.streams.len())
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}

/**
    Copy extradata into a padded libav allocation owned by `par`.
*/
unsafe fn set_extradata(par: *mut ffi::AVCodecParameters, extradata: Option<&[u8]>) {
    let Some(extradata) = extradata.filter(|e| !e.is_empty()) else {
        return;
    };

    unsafe {
        let alloc_size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        let buf = ffi::av_mallocz(alloc_size) as *mut u8;
        if !buf.is_null() {
            ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
            (*par).extradata = buf;
            (*par).extradata_size = extradata.len() as i32;
        }
    }
}

unsafe fn set_video_parameters(
    par: *mut ffi::AVCodecParameters,
    info: &VideoStreamInfo,
) -> Result<(), NativeError> {
    unsafe {
        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
        (*par).codec_id = match info.codec_id {
            CodecId::H264 => ffi::AVCodecID::AV_CODEC_ID_H264,
            CodecId::H265 => ffi::AVCodecID::AV_CODEC_ID_HEVC,
            CodecId::Vp9 => ffi::AVCodecID::AV_CODEC_ID_VP9,
            CodecId::Av1 => ffi::AVCodecID::AV_CODEC_ID_AV1,
            other => {
                return Err(NativeError::new(
                    "add_stream",
                    EINVAL,
                    format!("{other:?} is not a video codec"),
                ));
            }
        };

        (*par).width = info.width as i32;
        (*par).height = info.height as i32;
        (*par).format = match info.pixel_format {
            PixelFormat::Yuv420p => ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32,
            PixelFormat::Nv12 => ffi::AVPixelFormat::AV_PIX_FMT_NV12 as i32,
            PixelFormat::Bgra => ffi::AVPixelFormat::AV_PIX_FMT_BGRA as i32,
            PixelFormat::Rgba => ffi::AVPixelFormat::AV_PIX_FMT_RGBA as i32,
            PixelFormat::Yuv420p10 => ffi::AVPixelFormat::AV_PIX_FMT_YUV420P10LE as i32,
            _ => ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32,
        };

        set_extradata(par, info.extradata.as_deref());
        if let Some(bitrate) = info.bitrate {
            (*par).bit_rate = bitrate as i64;
        }
        if let Some(profile) = info.profile {
            (*par).profile = profile;
        }
        if let Some(level) = info.level {
            (*par).level = level;
        }
    }

    Ok(())
}

unsafe fn set_audio_parameters(
    par: *mut ffi::AVCodecParameters,
    info: &AudioStreamInfo,
) -> Result<(), NativeError> {
    unsafe {
        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*par).codec_id = match info.codec_id {
            CodecId::Aac => ffi::AVCodecID::AV_CODEC_ID_AAC,
            CodecId::Opus => ffi::AVCodecID::AV_CODEC_ID_OPUS,
            CodecId::Mp3 => ffi::AVCodecID::AV_CODEC_ID_MP3,
            other => {
                return Err(NativeError::new(
                    "add_stream",
                    EINVAL,
                    format!("{other:?} is not an audio codec"),
                ));
            }
        };

        (*par).sample_rate = info.sample_rate as i32;
        ffi::av_channel_layout_default(&mut (*par).ch_layout, info.channel_count() as i32);
        (*par).format = match info.sample_format {
            SampleFormat::F32 => ffi::AVSampleFormat::AV_SAMPLE_FMT_FLT as i32,
            SampleFormat::F64 => ffi::AVSampleFormat::AV_SAMPLE_FMT_DBL as i32,
            SampleFormat::S16 => ffi::AVSampleFormat::AV_SAMPLE_FMT_S16 as i32,
            SampleFormat::S32 => ffi::AVSampleFormat::AV_SAMPLE_FMT_S32 as i32,
            SampleFormat::U8 => ffi::AVSampleFormat::AV_SAMPLE_FMT_U8 as i32,
            _ => ffi::AVSampleFormat::AV_SAMPLE_FMT_FLT as i32,
        };

        set_extradata(par, info.extradata.as_deref());
        if let Some(bitrate) = info.bitrate {
            (*par).bit_rate = bitrate as i64;
        }
        if let Some(profile) = info.profile {
            (*par).profile = profile;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::events::{Event, EventSink};
    use crate::{Muxer, MuxerOptions};

    #[test]
    fn timestamps_follow_effective_timebase() {
        let packet = Packet::new(vec![0])
            .with_pts(3000)
            .with_dts(1500)
            .with_duration(1500);

        let (pts, dts, duration) =
            packet_timestamps(&packet, Rational::new(1, 90000), Rational::new(1, 1000)).unwrap();
        assert_eq!((pts, dts, duration), (33, 17, 17));
    }

    #[test]
    fn missing_timestamps_become_nopts() {
        let packet = Packet::new(vec![0]).with_duration(10);
        let tb = Rational::new(1, 1000);

        let (pts, dts, duration) = packet_timestamps(&packet, tb, tb).unwrap();
        assert_eq!(pts, ffi::AV_NOPTS_VALUE);
        assert_eq!(dts, ffi::AV_NOPTS_VALUE);
        assert_eq!(duration, 10);
    }

    #[test]
    fn invalid_timebase_is_rejected() {
        let packet = Packet::new(vec![0]).with_pts(1);
        assert!(packet_timestamps(&packet, Rational::new(1, 0), Rational::new(1, 1000)).is_none());
    }

    #[test]
    fn unknown_format_fails_to_allocate() {
        let err = FfmpegFactory
            .allocate(Some(&ContainerFormat::Named("no-such-format".into())), "out.bin")
            .unwrap_err();
        assert_eq!(err.operation, "allocate");
        assert!(err.code < 0);
    }

    #[test]
    fn writes_matroska_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mkv");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink: Arc<dyn EventSink> = {
            let events = Arc::clone(&events);
            Arc::new(move |event: Event| events.lock().push(event))
        };

        let muxer = Muxer::new(
            MuxerOptions::new(path.to_str().unwrap()).with_format(ContainerFormat::Matroska),
            &FfmpegFactory,
            sink,
        )
        .unwrap();
        muxer
            .add_stream(&StreamParams::Video(VideoStreamInfo::new(
                CodecId::Vp9,
                640,
                360,
                Rational::new(1, 1000),
            )))
            .unwrap();
        muxer.start().unwrap();
        muxer.stop();
        muxer.wait();

        assert!(events.lock().iter().all(|e| e.error().is_none()));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
