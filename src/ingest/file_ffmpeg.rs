//! Local video decoding and encoding with FFmpeg.
//!
//! Decoded frames are converted to packed RGB24 in memory. The sink encodes
//! MPEG-4 Part 2 (`mp4v`) at the source frame rate and resolution.

use anyhow::{anyhow, bail, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling::{self, flag::Flags};
use ffmpeg::util::format::pixel::Pixel;
use ffmpeg::Rational;

use super::{StreamInfo, DEFAULT_FRAME_RATE};
use crate::frame::Frame;

const OUTPUT_BIT_RATE: usize = 4_000_000;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: scaling::Context,
    info: StreamInfo,
    frames_read: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", path))?;
        let stream_index = stream.index();
        let frame_rate = rate_to_f64(stream.avg_frame_rate())
            .or_else(|| rate_to_f64(stream.rate()))
            .unwrap_or(DEFAULT_FRAME_RATE);
        let frame_count_hint = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let info = StreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            frame_count_hint,
        };
        log::info!(
            "VideoFileSource: connected to {} (ffmpeg, {}x{} @ {:.2} fps)",
            path,
            info.width,
            info.height,
            info.frame_rate
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            info,
            frames_read: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn info(&self) -> StreamInfo {
        self.info
    }

    pub(crate) fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = receive(&mut self.decoder, &mut self.scaler)? {
            self.frames_read += 1;
            return Ok(Some(frame));
        }
        if self.eof_sent {
            return Ok(None);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(frame) = receive(&mut self.decoder, &mut self.scaler)? {
                self.frames_read += 1;
                return Ok(Some(frame));
            }
        }

        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        self.eof_sent = true;
        let frame = receive(&mut self.decoder, &mut self.scaler)?;
        match &frame {
            Some(_) => self.frames_read += 1,
            None => log::info!(
                "VideoFileSource: {} exhausted after {} frame(s)",
                self.path,
                self.frames_read
            ),
        }
        Ok(frame)
    }
}

fn receive(
    decoder: &mut ffmpeg::codec::decoder::Video,
    scaler: &mut scaling::Context,
) -> Result<Option<Frame>> {
    let mut decoded = ffmpeg::frame::Video::empty();
    if !output_ready(decoder.receive_frame(&mut decoded)).context("ffmpeg decoder failed")? {
        return Ok(None);
    }
    let mut rgb = ffmpeg::frame::Video::empty();
    scaler
        .run(&decoded, &mut rgb)
        .context("scale frame to RGB")?;
    let (pixels, width, height) = frame_to_pixels(&rgb)?;
    Ok(Some(Frame::new(pixels, width, height)?))
}

/// `Ok(false)` when the codec wants more input (`EAGAIN`) or is fully
/// drained (`Eof`). Any other codec error is a fault.
fn output_ready(received: Result<(), ffmpeg::Error>) -> Result<bool, ffmpeg::Error> {
    match received {
        Ok(()) => Ok(true),
        Err(ffmpeg::Error::Eof) => Ok(false),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(false),
        Err(err) => Err(err),
    }
}

fn rate_to_f64(rate: Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    Some(f64::from(rate))
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Encoder
// ----------------------------------------------------------------------------

pub(crate) struct FfmpegFileSink {
    path: String,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    frames_written: u64,
    finished: bool,
}

impl FfmpegFileSink {
    pub(crate) fn create(path: &str, info: StreamInfo) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        if let Some(parent) = std::path::Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // 4:2:0 chroma needs even dimensions.
        let (out_w, out_h) = (info.width & !1, info.height & !1);
        if out_w == 0 || out_h == 0 {
            bail!("cannot encode {}x{} video", info.width, info.height);
        }
        if (out_w, out_h) != (info.width, info.height) {
            log::warn!(
                "VideoFileSink: cropping {}x{} to {}x{} for encoding",
                info.width,
                info.height,
                out_w,
                out_h
            );
        }

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create video output '{}'", path))?;
        let codec = ffmpeg::codec::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MPEG-4 encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let frame_rate = Rational::from(if info.frame_rate > 0.0 {
            info.frame_rate
        } else {
            DEFAULT_FRAME_RATE
        });
        let time_base = frame_rate.invert();

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create MPEG-4 encoder")?;
        encoder.set_width(out_w);
        encoder.set_height(out_h);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_bit_rate(OUTPUT_BIT_RATE);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().context("write container header")?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            out_w,
            out_h,
            Pixel::YUV420P,
            out_w,
            out_h,
            Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "VideoFileSink: writing {} ({}x{} @ {:.2} fps)",
            path,
            out_w,
            out_h,
            f64::from(frame_rate)
        );

        Ok(Self {
            path: path.to_string(),
            output,
            encoder,
            scaler,
            stream_index,
            time_base,
            width: out_w,
            height: out_h,
            frames_written: 0,
            finished: false,
        })
    }

    pub(crate) fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub(crate) fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            bail!("{} is already finalized", self.path);
        }
        if frame.width() < self.width || frame.height() < self.height {
            bail!(
                "frame {}x{} is smaller than the {}x{} output",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
        }

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let src_row = frame.width() as usize * 3;
        let dst_row = self.width as usize * 3;
        let plane = rgb.data_mut(0);
        for (y, src) in frame
            .pixels()
            .chunks_exact(src_row)
            .take(self.height as usize)
            .enumerate()
        {
            plane[y * stride..y * stride + dst_row].copy_from_slice(&src[..dst_row]);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.frames_written as i64));
        self.encoder
            .send_frame(&yuv)
            .context("send frame to MPEG-4 encoder")?;
        self.drain()?;
        self.frames_written += 1;
        Ok(())
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush MPEG-4 encoder")?;
        self.drain()?;
        self.output
            .write_trailer()
            .with_context(|| format!("finalize {}", self.path))?;
        log::info!(
            "VideoFileSink: wrote {} frame(s) to {}",
            self.frames_written,
            self.path
        );
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(self.time_base);
        let mut packet = ffmpeg::Packet::empty();
        while output_ready(self.encoder.receive_packet(&mut packet))
            .context("ffmpeg encoder failed")?
        {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write video packet")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_backpressure_and_drain_are_not_faults() {
        assert!(output_ready(Ok(())).unwrap());
        assert!(!output_ready(Err(ffmpeg::Error::Eof)).unwrap());
        assert!(!output_ready(Err(ffmpeg::Error::Other {
            errno: ffmpeg::error::EAGAIN
        }))
        .unwrap());
    }

    #[test]
    fn decoder_errors_are_propagated() {
        assert!(output_ready(Err(ffmpeg::Error::InvalidData)).is_err());
        assert!(output_ready(Err(ffmpeg::Error::Other {
            errno: ffmpeg::error::EINVAL
        }))
        .is_err());
    }
}
