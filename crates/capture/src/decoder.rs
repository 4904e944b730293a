use crate::device::RgbFrame;
use anyhow::{Result, bail};
use common::{span, span_debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    pub fn decoder(self) -> Box<dyn FrameDecoder> {
        match self {
            PixelFormat::Yuyv => Box::new(YuyvDecoder),
            PixelFormat::Mjpeg => Box::new(MjpegDecoder),
        }
    }
}

/// Turns a raw device buffer into packed RGB8.
pub trait FrameDecoder: Send {
    fn decode(&self, raw: &[u8], width: u32, height: u32) -> Result<RgbFrame>;
}

/// YUYV (YUV 4:2:2): 2 pixels in 4 bytes, `[Y0, U, Y1, V]`.
pub struct YuyvDecoder;

impl FrameDecoder for YuyvDecoder {
    fn decode(&self, raw: &[u8], width: u32, height: u32) -> Result<RgbFrame> {
        let _s = span!("decode_yuyv");

        if width == 0 || height == 0 || width % 2 != 0 {
            bail!("YUYV frame needs a non-zero, even width (got {}x{})", width, height);
        }

        let bytes_per_row = width as usize * 2;
        let stride = raw.len() / height as usize;
        if stride < bytes_per_row {
            bail!(
                "YUYV buffer too short: {} bytes for {}x{}",
                raw.len(),
                width,
                height
            );
        }

        let mut pixels = Vec::with_capacity(RgbFrame::expected_len(width, height));
        let _rows = span_debug!("yuyv_rows_to_rgb");
        for row in raw.chunks_exact(stride).take(height as usize) {
            for chunk in row[..bytes_per_row].chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601, 8-bit fixed point
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    pixels.push((y + rv).clamp(0, 255) as u8);
                    pixels.push((y - gu).clamp(0, 255) as u8);
                    pixels.push((y + bu).clamp(0, 255) as u8);
                }
            }
        }

        Ok(RgbFrame {
            width,
            height,
            pixels,
        })
    }
}

/// Motion JPEG: every buffer is a complete JPEG image. Dimensions come from the
/// JPEG header, not from the negotiated format.
pub struct MjpegDecoder;

impl FrameDecoder for MjpegDecoder {
    fn decode(&self, raw: &[u8], _width: u32, _height: u32) -> Result<RgbFrame> {
        let _s = span!("decode_mjpeg");

        let image = image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = image.dimensions();

        Ok(RgbFrame {
            width,
            height,
            pixels: image.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_neutral_gray() {
        // 2x1, Y=128 with neutral chroma
        let frame = YuyvDecoder.decode(&[128, 128, 128, 128], 2, 1).unwrap();
        assert_eq!(frame.pixels, vec![128; 6]);
        assert!(frame.is_complete());
    }

    #[test]
    fn yuyv_respects_row_padding() {
        // 2x2 with 2 bytes of padding per row
        let raw = [
            16, 128, 16, 128, 0, 0, //
            235, 128, 235, 128, 0, 0,
        ];
        let frame = YuyvDecoder.decode(&raw, 2, 2).unwrap();
        assert_eq!(&frame.pixels[..3], &[16, 16, 16]);
        assert_eq!(&frame.pixels[6..9], &[235, 235, 235]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(YuyvDecoder.decode(&[0; 4], 4, 2).is_err());
    }

    #[test]
    fn mjpeg_invalid_data() {
        assert!(MjpegDecoder.decode(&[0, 1, 2, 3], 640, 480).is_err());
    }

    #[test]
    fn mjpeg_reads_size_from_header() {
        let mut jpeg = Vec::new();
        image::RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]))
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let frame = PixelFormat::Mjpeg.decoder().decode(&jpeg, 0, 0).unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert!(frame.is_complete());
    }
}
