use std::path::Path;

use ffmpeg_next as ffmpeg;
use image::{DynamicImage, ImageBuffer, Rgb};

use crate::error::VisionError;

const FALLBACK_FPS: f64 = 30.0;

/// A decoded video file, iterated frame by frame in presentation order.
pub struct VideoSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    fps: f64,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, VisionError> {
        ffmpeg::init().map_err(|e| VisionError::VideoOpen(e.to_string()))?;

        let input = ffmpeg::format::input(&path).map_err(|e| VisionError::VideoOpen(e.to_string()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| VisionError::VideoOpen("no video stream found".into()))?;
        let stream_index = stream.index();

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() == 0 {
            log::warn!("container reports unparsable frame rate, falling back to {FALLBACK_FPS}");
            FALLBACK_FPS
        } else {
            let value = rate.numerator() as f64 / rate.denominator() as f64;
            if value <= 0.0 {
                log::warn!("container reports zero frame rate, falling back to {FALLBACK_FPS}");
                FALLBACK_FPS
            } else {
                value
            }
        };

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| VisionError::VideoOpen(e.to_string()))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| VisionError::VideoOpen(e.to_string()))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| VisionError::VideoOpen(e.to_string()))?;

        log::debug!(
            "opened video {}: {}x{} @ {:.3} fps",
            path.display(),
            decoder.width(),
            decoder.height(),
            fps
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            fps,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Decodes and returns every frame in presentation order. Errors for
    /// an individual frame are yielded rather than silently dropped so
    /// the caller's scheduler can log and skip per spec.
    pub fn frames(&mut self) -> impl Iterator<Item = Result<DynamicImage, VisionError>> + '_ {
        FrameIter { source: self }
    }
}

struct FrameIter<'a> {
    source: &'a mut VideoSource,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<DynamicImage, VisionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream_index = self.source.stream_index;
        loop {
            let mut packet_iter = self.source.input.packets();
            let (stream, packet) = packet_iter.next()?;
            if stream.index() != stream_index {
                continue;
            }

            if let Err(e) = self.source.decoder.send_packet(&packet) {
                return Some(Err(VisionError::FrameDecode(e.to_string())));
            }

            let mut decoded = ffmpeg::frame::Video::empty();
            match self.source.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let mut rgb_frame = ffmpeg::frame::Video::empty();
                    if let Err(e) = self.source.scaler.run(&decoded, &mut rgb_frame) {
                        return Some(Err(VisionError::FrameDecode(e.to_string())));
                    }
                    return Some(to_dynamic_image(&rgb_frame));
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    continue;
                }
                Err(e) => return Some(Err(VisionError::FrameDecode(e.to_string()))),
            }
        }
    }
}

fn to_dynamic_image(frame: &ffmpeg::frame::Video) -> Result<DynamicImage, VisionError> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);

    let expected_row_bytes = (width * 3) as usize;
    let mut buf = Vec::with_capacity(expected_row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        buf.extend_from_slice(&data[start..start + expected_row_bytes]);
    }

    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, buf)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| VisionError::FrameDecode("failed to build image buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_fps_constant() {
        assert_eq!(FALLBACK_FPS, 30.0);
    }
}
