use super::error::ScanError;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 图像旋转角度（仅作为元数据传递给解码器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Result<Self, ScanError> {
        match degrees {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(ScanError::invalid_frame(format!(
                "rotation must be 0, 90, 180 or 270 (got {})",
                other
            ))),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = ScanError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// 扫描区域 - 中心裁剪 + 降采样
///
/// `crop_factor` 为保留的宽高比例，`downscale` 为整数降采样倍数。
/// 默认值（1.0, 1）表示整帧，不做任何处理。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRegion {
    pub crop_factor: f32,
    pub downscale: u32,
}

impl Default for ScanRegion {
    fn default() -> Self {
        Self {
            crop_factor: 1.0,
            downscale: 1,
        }
    }
}

impl ScanRegion {
    pub fn is_full_frame(&self) -> bool {
        self.crop_factor >= 1.0 && self.downscale <= 1
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.crop_factor > 0.0 && self.crop_factor <= 1.0) {
            return Err(ScanError::Config(format!(
                "crop_factor must be in (0, 1] (got {})",
                self.crop_factor
            )));
        }
        if self.downscale == 0 {
            return Err(ScanError::Config("downscale must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// 从宿主传入的单通道（亮度）帧
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pixels: Cow<'a, [u8]>,
    width: u32,
    height: u32,
    rotation: Rotation,
}

impl<'a> RawFrame<'a> {
    /// 校验几何信息；长度必须严格等于 width * height
    pub fn new(
        pixels: impl Into<Cow<'a, [u8]>>,
        width: i32,
        height: i32,
        rotation: Rotation,
    ) -> Result<Self, ScanError> {
        let pixels = pixels.into();

        if pixels.is_empty() {
            return Err(ScanError::invalid_frame("pixel buffer is empty"));
        }
        if width <= 0 || height <= 0 {
            return Err(ScanError::invalid_frame(format!(
                "dimensions must be positive (got {}x{})",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| {
                ScanError::invalid_frame(format!("dimensions overflow ({}x{})", width, height))
            })?;
        if pixels.len() != expected {
            return Err(ScanError::invalid_frame(format!(
                "buffer holds {} bytes but {}x{} needs {}",
                pixels.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            pixels,
            width: width as u32,
            height: height as u32,
            rotation,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// 中心裁剪并按整数倍最近邻降采样；整帧区域直接返回自身，不复制
    pub fn apply_region(self, region: &ScanRegion) -> Result<RawFrame<'a>, ScanError> {
        if region.is_full_frame() {
            return Ok(self);
        }
        region.validate()?;

        let w = self.width as usize;
        let h = self.height as usize;
        let step = region.downscale.max(1) as usize;

        let crop_w = ((w as f32 * region.crop_factor) as usize).min(w);
        let crop_h = ((h as f32 * region.crop_factor) as usize).min(h);
        let x_offset = (w - crop_w) / 2;
        let y_offset = (h - crop_h) / 2;

        let out_w = crop_w / step;
        let out_h = crop_h / step;
        if out_w == 0 || out_h == 0 {
            return Err(ScanError::invalid_frame(format!(
                "scan region {:?} leaves no pixels in a {}x{} frame",
                region, w, h
            )));
        }

        let mut scaled = Vec::with_capacity(out_w * out_h);
        for out_y in 0..out_h {
            let row_start = (y_offset + out_y * step) * w + x_offset;
            for out_x in 0..out_w {
                scaled.push(self.pixels[row_start + out_x * step]);
            }
        }

        Ok(RawFrame {
            pixels: Cow::Owned(scaled),
            width: out_w as u32,
            height: out_h as u32,
            rotation: self.rotation,
        })
    }

    /// 灰度 → RGBA，R = G = B = 亮度，alpha = 255
    pub fn to_image(&self) -> Result<DecodableImage, ScanError> {
        let rgba: Vec<u8> = self.pixels.iter().flat_map(|&g| [g, g, g, 255]).collect();
        let pixels = RgbaImage::from_raw(self.width, self.height, rgba).ok_or_else(|| {
            ScanError::invalid_frame(format!(
                "cannot build {}x{} image from {} bytes",
                self.width,
                self.height,
                self.pixels.len()
            ))
        })?;

        Ok(DecodableImage {
            pixels,
            rotation: self.rotation,
        })
    }
}

/// 解码器输入：RGBA 像素 + 旋转元数据
#[derive(Debug, Clone)]
pub struct DecodableImage {
    pixels: RgbaImage,
    rotation: Rotation,
}

impl DecodableImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Luminance of a converted pixel. Channels are equal, so red is enough.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.pixels.get_pixel(x, y)[0]
    }

    #[cfg(test)]
    fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// 灰度帧转换器（纯函数，无副作用）
pub struct FrameConverter;

impl FrameConverter {
    pub fn convert(
        pixels: &[u8],
        width: i32,
        height: i32,
        rotation: Rotation,
    ) -> Result<DecodableImage, ScanError> {
        RawFrame::new(pixels, width, height, rotation)?.to_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Vec<u8> {
        (0..width * height).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_convert_expands_gray_to_opaque_rgb() {
        let (w, h) = (7usize, 5usize);
        let pixels = gradient(w, h);
        let image = FrameConverter::convert(&pixels, w as i32, h as i32, Rotation::Deg0).unwrap();

        assert_eq!(image.width(), w as u32);
        assert_eq!(image.height(), h as u32);
        for y in 0..h {
            for x in 0..w {
                let g = pixels[y * w + x];
                assert_eq!(image.pixel(x as u32, y as u32), Rgba([g, g, g, 255]));
            }
        }
    }

    #[test]
    fn test_convert_black_2x2() {
        let image = FrameConverter::convert(&[0, 0, 0, 0], 2, 2, Rotation::Deg0).unwrap();
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(image.pixel(x, y), Rgba([0, 0, 0, 255]));
            }
        }
    }

    #[test]
    fn test_luma_reads_back_source_value() {
        let image = FrameConverter::convert(&[0x12, 0xFF], 2, 1, Rotation::Deg0).unwrap();
        assert_eq!(image.pixel(0, 0), Rgba([0x12, 0x12, 0x12, 0xFF]));
        assert_eq!(image.luma(0, 0), 0x12);
        assert_eq!(image.luma(1, 0), 0xFF);
    }

    #[test]
    fn test_rotation_is_metadata_only() {
        let pixels = gradient(3, 2);
        let upright = FrameConverter::convert(&pixels, 3, 2, Rotation::Deg0).unwrap();
        let rotated = FrameConverter::convert(&pixels, 3, 2, Rotation::Deg270).unwrap();

        assert_eq!(rotated.rotation(), Rotation::Deg270);
        assert_eq!(rotated.width(), 3);
        assert_eq!(rotated.height(), 2);
        assert_eq!(upright.as_rgba().as_raw(), rotated.as_rgba().as_raw());
    }

    #[test]
    fn test_length_mismatch_is_invalid() {
        let result = FrameConverter::convert(&[1, 2, 3], 2, 2, Rotation::Deg0);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));

        let result = FrameConverter::convert(&[1, 2, 3, 4, 5], 2, 2, Rotation::Deg0);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn test_non_positive_dimensions_are_invalid() {
        for (w, h) in [(0, 4), (4, 0), (-2, -2), (-1, 4)] {
            let result = FrameConverter::convert(&[0; 4], w, h, Rotation::Deg0);
            assert!(matches!(result, Err(ScanError::InvalidFrame(_))), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_empty_buffer_is_invalid() {
        let result = FrameConverter::convert(&[], 10, 10, Rotation::Deg0);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn test_huge_dimensions_do_not_overflow() {
        let result = FrameConverter::convert(&[0; 4], i32::MAX, i32::MAX, Rotation::Deg0);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0).unwrap(), Rotation::Deg0);
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(180).unwrap().degrees(), 180);
        assert_eq!(Rotation::from_degrees(270).unwrap().to_string(), "270°");
        assert!(Rotation::from_degrees(45).is_err());
        assert!(Rotation::from_degrees(-90).is_err());
        assert!(Rotation::from_degrees(360).is_err());
    }

    #[test]
    fn test_full_frame_region_borrows() {
        let pixels = gradient(4, 4);
        let frame = RawFrame::new(&pixels[..], 4, 4, Rotation::Deg0).unwrap();
        let frame = frame.apply_region(&ScanRegion::default()).unwrap();

        assert!(matches!(frame.pixels, Cow::Borrowed(_)));
        assert_eq!(frame.pixels(), &pixels[..]);
    }

    #[test]
    fn test_center_crop() {
        // 4x4, 中心 2x2 = [5, 6, 9, 10]
        let pixels: Vec<u8> = (0..16).collect();
        let region = ScanRegion {
            crop_factor: 0.5,
            downscale: 1,
        };
        let frame = RawFrame::new(pixels, 4, 4, Rotation::Deg90)
            .unwrap()
            .apply_region(&region)
            .unwrap();

        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.pixels(), &[5, 6, 9, 10]);
        assert_eq!(frame.rotation(), Rotation::Deg90);
    }

    #[test]
    fn test_downscale_samples_every_nth_pixel() {
        let pixels: Vec<u8> = (0..16).collect();
        let region = ScanRegion {
            crop_factor: 1.0,
            downscale: 2,
        };
        let frame = RawFrame::new(pixels, 4, 4, Rotation::Deg0)
            .unwrap()
            .apply_region(&region)
            .unwrap();

        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.pixels(), &[0, 2, 8, 10]);
    }

    #[test]
    fn test_region_too_small_is_invalid() {
        let region = ScanRegion {
            crop_factor: 0.1,
            downscale: 4,
        };
        let result = RawFrame::new(vec![0u8; 16], 4, 4, Rotation::Deg0)
            .unwrap()
            .apply_region(&region);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn test_region_validation() {
        assert!(ScanRegion::default().validate().is_ok());
        for (crop_factor, downscale) in [(0.0, 1), (1.5, 1), (0.4, 0)] {
            let region = ScanRegion {
                crop_factor,
                downscale,
            };
            assert!(region.validate().is_err(), "{:?}", region);
        }
    }
}
