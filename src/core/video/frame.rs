use image::RgbImage;
use std::time::Duration;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB24 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: Duration, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// 复制出一份独立的图像缓冲区（标注时不修改原帧）
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Option<Frame> {
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone())?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Some(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    /// 等比缩放到不超过 `max_width` 的宽度；已经足够小时原样返回
    pub fn downscale_to_width(self, max_width: u32) -> Frame {
        if max_width == 0 || self.width <= max_width {
            return self;
        }
        let target_height = ((self.height as u64 * max_width as u64) / self.width as u64).max(1) as u32;
        match self.resize_to(max_width, target_height) {
            Some(resized) => resized,
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let data = vec![255u8; 100 * 100 * 3]; // 100x100 white image
        let frame = Frame::new(100, 100, data, Duration::from_millis(1000), 30);

        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 100);
        assert_eq!(frame.pixel_count(), 10000);
        assert_eq!(frame.timestamp.as_millis(), 1000);
        assert_eq!(frame.frame_number, 30);
    }

    #[test]
    fn test_frame_resize() {
        let data = vec![255u8; 100 * 100 * 3];
        let frame = Frame::new(100, 100, data, Duration::ZERO, 0);
        let resized = frame.resize_to(32, 32).unwrap();

        assert_eq!(resized.width, 32);
        assert_eq!(resized.height, 32);
        assert_eq!(resized.data.len(), 32 * 32 * 3);
    }

    #[test]
    fn test_downscale_keeps_aspect_ratio() {
        let frame = Frame::new(640, 360, vec![0u8; 640 * 360 * 3], Duration::ZERO, 0);
        let scaled = frame.downscale_to_width(320);
        assert_eq!((scaled.width, scaled.height), (320, 180));

        let small = Frame::new(64, 36, vec![0u8; 64 * 36 * 3], Duration::ZERO, 7);
        let untouched = small.downscale_to_width(320);
        assert_eq!((untouched.width, untouched.frame_number), (64, 7));
    }

    #[test]
    fn test_to_image_is_a_copy() {
        let frame = Frame::new(2, 2, vec![10u8; 12], Duration::ZERO, 0);
        let mut img = frame.to_image().unwrap();
        img.put_pixel(0, 0, image::Rgb([200, 200, 200]));
        assert_eq!(frame.data[0], 10);
    }

    #[test]
    fn test_invalid_buffer_yields_none() {
        let frame = Frame::new(10, 10, vec![0u8; 5], Duration::ZERO, 0);
        assert!(frame.to_image().is_none());
        assert!(frame.resize_to(4, 4).is_none());
    }
}
