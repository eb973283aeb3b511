use image::{imageops, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::core::error::ScoringError;

/// 抽出的单帧（RGB），记录来源视频与序号
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub width: u32,
    pub height: u32,
    pub index: usize,
    source: PathBuf,
    pixels: RgbImage,
}

impl FrameSample {
    pub fn new(pixels: RgbImage, source: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            index,
            source: source.into(),
            pixels,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    /// 缩放到模型输入尺寸；尺寸一致时直接克隆
    pub fn resize_to(&self, target_width: u32, target_height: u32) -> RgbImage {
        if self.width == target_width && self.height == target_height {
            return self.pixels.clone();
        }
        imageops::resize(
            &self.pixels,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        )
    }

    /// JPEG 编码，用于界面预览
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, ScoringError> {
        let mut buffer = Cursor::new(Vec::new());
        self.pixels.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_creation() {
        let pixels = RgbImage::from_pixel(100, 80, Rgb([255, 255, 255]));
        let frame = FrameSample::new(pixels, "clip.avi", 3);

        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 80);
        assert_eq!(frame.pixel_count(), 8000);
        assert_eq!(frame.index, 3);
        assert_eq!(frame.source(), Path::new("clip.avi"));
    }

    #[test]
    fn test_frame_resize() {
        let pixels = RgbImage::from_pixel(100, 100, Rgb([10, 20, 30]));
        let frame = FrameSample::new(pixels, "clip.avi", 0);
        let resized = frame.resize_to(32, 24);

        assert_eq!(resized.dimensions(), (32, 24));
        assert_eq!(resized.get_pixel(5, 5), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_frame_to_jpeg() {
        let frame = FrameSample::new(RgbImage::from_pixel(16, 16, Rgb([200, 10, 10])), "clip.avi", 0);
        let jpeg = frame.to_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.to_rgb8().dimensions(), (16, 16));
    }
}
