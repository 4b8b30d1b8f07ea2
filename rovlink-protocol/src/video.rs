//! Camera frame batches.
//!
//! A camera-batch body carries 0..N raw images captured in one polling
//! cycle, resized to a common target width before transmission. The batch
//! schema is fixed big-endian binary:
//!
//! ```text
//! +----------+ per frame: +----------+----------+--------+-----------+--------+
//! | count    |            | width    | height   | format | pixel_len | pixels |
//! | 2 bytes  |            | 4 bytes  | 4 bytes  | 1 byte | 4 bytes   | ...    |
//! +----------+            +----------+----------+--------+-----------+--------+
//! ```
//!
//! Each frame record is independently decodable. Resizing is lossy and
//! irreversible; decoding never reconstructs the original dimensions.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum number of frames in one batch.
pub const MAX_BATCH_FRAMES: usize = u16::MAX as usize;

/// Pixel layout of a raw image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFormat {
    /// 3 bytes per pixel, blue-green-red order (camera native).
    Bgr8 = 1,
    /// 3 bytes per pixel, red-green-blue order.
    Rgb8 = 2,
    /// 1 byte per pixel, luminance only.
    Gray8 = 3,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Bgr8 => "bgr8",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Gray8 => "gray8",
        }
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PixelFormat::Bgr8),
            2 => Ok(PixelFormat::Rgb8),
            3 => Ok(PixelFormat::Gray8),
            _ => Err(ProtocolError::UnknownPixelFormat(value)),
        }
    }
}

/// One raw image: dimensions, pixel layout, and the pixel bytes in row-major
/// order with no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Bytes,
}

impl RawImage {
    /// Creates an image, validating that the pixel buffer matches the
    /// declared dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Bytes,
    ) -> Result<Self, ProtocolError> {
        let expected = width as u64 * height as u64 * format.bytes_per_pixel() as u64;
        if pixels.len() as u64 != expected {
            return Err(ProtocolError::PixelLengthMismatch {
                width,
                height,
                format: format.name(),
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Resizes to the given width with nearest-neighbor sampling, scaling
    /// the height to preserve aspect ratio (truncating fractional rows).
    pub fn resize_to_width(&self, target_width: u32) -> RawImage {
        if self.width == target_width || self.width == 0 || self.height == 0 {
            return self.clone();
        }

        let scale = target_width as f64 / self.width as f64;
        let target_height = ((self.height as f64 * scale) as u32).max(1);
        let bpp = self.format.bytes_per_pixel();

        let mut pixels =
            BytesMut::with_capacity(target_width as usize * target_height as usize * bpp);
        for y in 0..target_height {
            let src_y = ((y as f64 / scale) as u32).min(self.height - 1);
            let row = (src_y as usize) * (self.width as usize) * bpp;
            for x in 0..target_width {
                let src_x = ((x as f64 / scale) as u32).min(self.width - 1);
                let offset = row + (src_x as usize) * bpp;
                pixels.put_slice(&self.pixels[offset..offset + bpp]);
            }
        }

        RawImage {
            width: target_width,
            height: target_height,
            format: self.format,
            pixels: pixels.freeze(),
        }
    }

    fn encoded_len(&self) -> usize {
        // width + height + format + pixel_len + pixels
        4 + 4 + 1 + 4 + self.pixels.len()
    }
}

/// An ordered batch of raw images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBatch {
    pub frames: Vec<RawImage>,
}

impl FrameBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: RawImage) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Encodes the batch as-is, without resizing.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        Self::encode_frames(&self.frames)
    }

    /// Resizes every frame to `target_width` and encodes the result.
    pub fn encode_resized(&self, target_width: u32) -> Result<BytesMut, ProtocolError> {
        let resized: Vec<RawImage> = self
            .frames
            .iter()
            .map(|frame| frame.resize_to_width(target_width))
            .collect();
        Self::encode_frames(&resized)
    }

    fn encode_frames(frames: &[RawImage]) -> Result<BytesMut, ProtocolError> {
        if frames.len() > MAX_BATCH_FRAMES {
            return Err(ProtocolError::BatchTooLong {
                count: frames.len(),
                max: MAX_BATCH_FRAMES,
            });
        }

        let total: usize = 2 + frames.iter().map(RawImage::encoded_len).sum::<usize>();
        let mut buf = BytesMut::with_capacity(total);

        // Frame count (2 bytes)
        buf.put_u16(frames.len() as u16);

        for frame in frames {
            // Dimensions (4 + 4 bytes)
            buf.put_u32(frame.width);
            buf.put_u32(frame.height);

            // Pixel format tag (1 byte)
            buf.put_u8(frame.format as u8);

            // Pixel byte length (4 bytes)
            buf.put_u32(frame.pixels.len() as u32);

            // Pixels
            buf.put_slice(&frame.pixels);
        }

        Ok(buf)
    }

    /// Decodes a batch from a complete frame body.
    ///
    /// Bytes past the last frame record are ignored.
    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.remaining() < 2 {
            return Err(ProtocolError::TruncatedBatch {
                needed: 2 - body.remaining(),
            });
        }
        let count = body.get_u16() as usize;

        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            if body.remaining() < 13 {
                return Err(ProtocolError::TruncatedBatch {
                    needed: 13 - body.remaining(),
                });
            }
            let width = body.get_u32();
            let height = body.get_u32();
            let format = PixelFormat::try_from(body.get_u8())?;
            let pixel_len = body.get_u32() as usize;

            let expected = width as u64 * height as u64 * format.bytes_per_pixel() as u64;
            if pixel_len as u64 != expected {
                return Err(ProtocolError::PixelLengthMismatch {
                    width,
                    height,
                    format: format.name(),
                    actual: pixel_len,
                });
            }

            if body.remaining() < pixel_len {
                return Err(ProtocolError::TruncatedBatch {
                    needed: pixel_len - body.remaining(),
                });
            }
            let pixels = body.copy_to_bytes(pixel_len);

            frames.push(RawImage {
                width,
                height,
                format,
                pixels,
            });
        }

        Ok(Self { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient_image(width: u32, height: u32, format: PixelFormat) -> RawImage {
        let bpp = format.bytes_per_pixel();
        let mut pixels = BytesMut::with_capacity(width as usize * height as usize * bpp);
        for y in 0..height {
            for x in 0..width {
                for c in 0..bpp {
                    pixels.put_u8((x + y + c as u32) as u8);
                }
            }
        }
        RawImage::new(width, height, format, pixels.freeze()).unwrap()
    }

    #[test]
    fn test_batch_roundtrip() {
        let mut batch = FrameBatch::new();
        batch.push(gradient_image(8, 6, PixelFormat::Bgr8));
        batch.push(gradient_image(4, 4, PixelFormat::Gray8));

        let encoded = batch.encode().unwrap();
        let decoded = FrameBatch::decode(encoded.freeze()).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_empty_batch() {
        let batch = FrameBatch::new();
        let encoded = batch.encode().unwrap();
        assert_eq!(encoded.len(), 2);

        let decoded = FrameBatch::decode(encoded.freeze()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_pixel_length_validation() {
        let result = RawImage::new(4, 4, PixelFormat::Gray8, Bytes::from(vec![0u8; 15]));
        assert!(matches!(
            result,
            Err(ProtocolError::PixelLengthMismatch { actual: 15, .. })
        ));
    }

    #[test]
    fn test_resize_halves_cleanly() {
        let image = gradient_image(700, 400, PixelFormat::Bgr8);
        let resized = image.resize_to_width(350);
        assert_eq!(resized.width, 350);
        assert_eq!(resized.height, 200);
        assert_eq!(resized.pixels.len(), 350 * 200 * 3);
    }

    #[test]
    fn test_resize_nearest_neighbor_blocks() {
        // 2x2 gray image doubled to 4x4: each source pixel becomes a 2x2 block.
        let image = RawImage::new(
            2,
            2,
            PixelFormat::Gray8,
            Bytes::from(vec![10u8, 20, 30, 40]),
        )
        .unwrap();
        let resized = image.resize_to_width(4);
        assert_eq!(resized.height, 4);
        assert_eq!(
            resized.pixels.as_ref(),
            &[10, 10, 20, 20, 10, 10, 20, 20, 30, 30, 40, 40, 30, 30, 40, 40]
        );
    }

    #[test]
    fn test_resize_same_width_is_identity() {
        let image = gradient_image(350, 100, PixelFormat::Rgb8);
        let resized = image.resize_to_width(350);
        assert_eq!(resized, image);
    }

    #[test]
    fn test_encode_resized_sets_every_width() {
        let mut batch = FrameBatch::new();
        batch.push(gradient_image(640, 480, PixelFormat::Bgr8));
        batch.push(gradient_image(100, 80, PixelFormat::Gray8));
        batch.push(gradient_image(350, 10, PixelFormat::Rgb8));

        let encoded = batch.encode_resized(350).unwrap();
        let decoded = FrameBatch::decode(encoded.freeze()).unwrap();
        assert_eq!(decoded.len(), 3);
        for frame in &decoded.frames {
            assert_eq!(frame.width, 350);
        }
        // 640x480 scaled to 350 wide: height truncates to 262.
        assert_eq!(decoded.frames[0].height, 262);
    }

    #[test]
    fn test_decode_truncated() {
        let batch = FrameBatch {
            frames: vec![gradient_image(8, 8, PixelFormat::Gray8)],
        };
        let encoded = batch.encode().unwrap();
        let cut = encoded.len() - 10;
        let result = FrameBatch::decode(encoded.freeze().slice(..cut));
        assert!(matches!(
            result,
            Err(ProtocolError::TruncatedBatch { needed: 10 })
        ));
    }

    #[test]
    fn test_decode_unknown_format_tag() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u32(1);
        buf.put_u32(1);
        buf.put_u8(99);
        buf.put_u32(1);
        buf.put_u8(0);
        let result = FrameBatch::decode(buf.freeze());
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownPixelFormat(99))
        ));
    }

    #[test]
    fn test_decode_rejects_mismatched_pixel_len() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u32(2);
        buf.put_u32(2);
        buf.put_u8(PixelFormat::Gray8 as u8);
        buf.put_u32(3); // 2x2 gray needs 4
        buf.put_slice(&[0, 0, 0]);
        let result = FrameBatch::decode(buf.freeze());
        assert!(matches!(
            result,
            Err(ProtocolError::PixelLengthMismatch { actual: 3, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_resized_width_is_target(
            width in 1u32..128,
            height in 1u32..128,
            target in 1u32..256,
        ) {
            let image = gradient_image(width, height, PixelFormat::Gray8);
            let resized = image.resize_to_width(target);
            prop_assert_eq!(resized.width, target);

            let expected_height = if width == target {
                height
            } else {
                let scale = target as f64 / width as f64;
                ((height as f64 * scale) as u32).max(1)
            };
            prop_assert_eq!(resized.height, expected_height);
            prop_assert_eq!(
                resized.pixels.len(),
                (target * resized.height) as usize
            );
        }

        #[test]
        fn prop_batch_roundtrip(
            dims in proptest::collection::vec((1u32..32, 1u32..32), 0..4),
        ) {
            let mut batch = FrameBatch::new();
            for (w, h) in dims {
                batch.push(gradient_image(w, h, PixelFormat::Bgr8));
            }
            let encoded = batch.encode().unwrap();
            let decoded = FrameBatch::decode(encoded.freeze()).unwrap();
            prop_assert_eq!(decoded, batch);
        }
    }
}
