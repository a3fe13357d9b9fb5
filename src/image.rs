use crate::my_types::*;

/// Row-major interleaved 8-bit image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl Image {
    /// Create a black image
    pub fn new(width: usize, height: usize, channels: usize) -> Image {
        Image {
            data: vec![0; width * height * channels],
            width,
            height,
            channels,
        }
    }

    #[inline(always)]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let i = (y * self.width + x) * self.channels;
        &self.data[i..i + self.channels]
    }

    #[inline(always)]
    pub fn set_pixel(&mut self, x: usize, y: usize, value: &[u8]) {
        let i = (y * self.width + x) * self.channels;
        self.data[i..i + self.channels].copy_from_slice(value);
    }

    /// Bilinear sample at `p` into `out`, one value per channel. Coordinate
    /// (0, 0) is the center of the top-left pixel. Returns false if `p` lies
    /// outside the image.
    pub fn bilinear(&self, p: Vector2d, out: &mut [u8]) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        if p.x < -0.5 || p.y < -0.5 || p.x > max_x + 0.5 || p.y > max_y + 0.5 {
            return false;
        }
        let x = p.x.clamp(0., max_x);
        let y = p.y.clamp(0., max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let ax = x - x0 as f64;
        let ay = y - y0 as f64;

        for c in 0..self.channels {
            let v = |xi: usize, yi: usize| self.data[(yi * self.width + xi) * self.channels + c] as f64;
            let top = (1. - ax) * v(x0, y0) + ax * v(x1, y0);
            let bottom = (1. - ax) * v(x0, y1) + ax * v(x1, y1);
            out[c] = ((1. - ay) * top + ay * bottom).round().clamp(0., 255.) as u8;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear() {
        let mut image = Image::new(2, 2, 1);
        image.data = vec![0, 100, 100, 200];
        let mut out = [0];

        assert!(image.bilinear(Vector2d::new(0.5, 0.5), &mut out));
        assert_eq!(out, [100]);
        assert!(image.bilinear(Vector2d::new(1., 0.), &mut out));
        assert_eq!(out, [100]);
        assert!(image.bilinear(Vector2d::new(1.3, 1.3), &mut out));
        assert_eq!(out, [200]);
        assert!(!image.bilinear(Vector2d::new(2., 0.), &mut out));
        assert!(!image.bilinear(Vector2d::new(0., -0.7), &mut out));
    }

    #[test]
    fn test_pixels_with_channels() {
        let mut image = Image::new(3, 2, 3);
        image.set_pixel(2, 1, &[1, 2, 3]);
        assert_eq!(image.pixel(2, 1), &[1, 2, 3]);
        assert_eq!(image.pixel(0, 0), &[0, 0, 0]);
        assert_eq!(image.data.len(), 18);
    }
}
