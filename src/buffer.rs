use nalgebra::Vector3;

/// Per-pixel depth grid with nearest-wins write semantics.
/// Depth values follow the NDC convention of the projection builders, so a
/// smaller value is nearer to the camera.
#[derive(Clone)]
pub struct DepthBuffer {
    pub width: u32,
    pub height: u32,
    data: Vec<f32>,
}

/// The "nothing rendered here yet" depth, further than any projected fragment.
pub const FAR_DEPTH: f32 = f32::MAX;

impl DepthBuffer {
    /// Generates a new depth buffer with every entry at the far sentinel.
    pub fn new(width: u32, height: u32) -> DepthBuffer {
        return DepthBuffer {
            width,
            height,
            data: vec![FAR_DEPTH; (width * height) as usize],
        };
    }

    /// Resets every entry to the given depth, usually FAR_DEPTH.
    pub fn clear(&mut self, value: f32) {
        for entry in &mut self.data {
            *entry = value;
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        return self.data[(x + y * self.width) as usize];
    }

    /// Compares the candidate depth against the stored one and replaces it iff
    /// the candidate is strictly nearer. Returns whether the candidate won;
    /// on failure the buffer is left untouched.
    pub fn test_and_set(&mut self, x: u32, y: u32, depth: f32) -> bool {
        let index = (x + y * self.width) as usize;
        if depth < self.data[index] {
            self.data[index] = depth;
            return true;
        }
        return false;
    }

    /// Get a grayscale rgb8 view of the buffer for debug output, normalized
    /// over the written entries. Unwritten (far sentinel) pixels come out black.
    pub fn as_grayscale_data(&self) -> Vec<u8> {
        let written = self.data.iter().copied().filter(|&d| d < FAR_DEPTH);
        let z_max = written.clone().fold(f32::MIN, f32::max);
        let z_min = written.fold(f32::MAX, f32::min);
        let scale = if z_max > z_min { z_max - z_min } else { 1.0 };
        let mut grayscale = vec![0u8; 3 * self.data.len()];
        for (i, &depth) in self.data.iter().enumerate() {
            if depth >= FAR_DEPTH {
                continue;
            }
            // Near pixels come out bright.
            let scaled = ((z_max - depth) / scale * 255.0) as u8;
            grayscale[3 * i + 0] = scaled;
            grayscale[3 * i + 1] = scaled;
            grayscale[3 * i + 2] = scaled;
        }
        return grayscale;
    }
}

/// Per-pixel linear RGB grid, each component in [0, 1].
/// (0, 0) is the bottom left coordinate.
#[derive(Clone)]
pub struct ColorBuffer {
    pub width: u32,
    pub height: u32,
    data: Vec<Vector3<f32>>,
}

impl ColorBuffer {
    /// Generates a new color buffer filled with the background color.
    pub fn new(width: u32, height: u32, background: Vector3<f32>) -> ColorBuffer {
        return ColorBuffer {
            width,
            height,
            data: vec![background; (width * height) as usize],
        };
    }

    /// Resets every pixel to the given color.
    pub fn clear(&mut self, color: Vector3<f32>) {
        for entry in &mut self.data {
            *entry = color;
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Vector3<f32> {
        return self.data[(x + y * self.width) as usize];
    }

    /// Overwrites the pixel unconditionally; depth arbitration happens before
    /// this call, in the rasterizer.
    pub fn set(&mut self, x: u32, y: u32, color: Vector3<f32>) {
        self.data[(x + y * self.width) as usize] = color;
    }

    /// Get the buffer as flat rgb8 data of size 3 * (number of pixels),
    /// clamped and with rows flipped so image writers see (0, 0) top left.
    pub fn as_rgb8_data(&self) -> Vec<u8> {
        let mut pixel_data = vec![0u8; 3 * self.data.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let color = self.get(x, y);
                let index = (3 * (x + (self.height - 1 - y) * self.width)) as usize;
                pixel_data[index + 0] = (color.x.clamp(0.0, 1.0) * 255.0) as u8;
                pixel_data[index + 1] = (color.y.clamp(0.0, 1.0) * 255.0) as u8;
                pixel_data[index + 2] = (color.z.clamp(0.0, 1.0) * 255.0) as u8;
            }
        }
        return pixel_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::vector;

    #[test]
    fn depth_buffer_nearest_write_wins_regardless_of_order() {
        let mut buffer = DepthBuffer::new(4, 4);
        assert!(buffer.test_and_set(1, 2, 5.0));
        assert!(buffer.test_and_set(1, 2, 3.0));
        assert!(!buffer.test_and_set(1, 2, 4.0));
        assert_relative_eq!(buffer.get(1, 2), 3.0);

        let mut reordered = DepthBuffer::new(4, 4);
        assert!(reordered.test_and_set(1, 2, 3.0));
        assert!(!reordered.test_and_set(1, 2, 5.0));
        assert!(!reordered.test_and_set(1, 2, 4.0));
        assert_relative_eq!(reordered.get(1, 2), 3.0);
    }

    #[test]
    fn depth_buffer_equal_depth_does_not_rewrite() {
        let mut buffer = DepthBuffer::new(2, 2);
        assert!(buffer.test_and_set(0, 0, 1.0));
        assert!(!buffer.test_and_set(0, 0, 1.0));
    }

    #[test]
    fn depth_buffer_clear_restores_far_sentinel() {
        let mut buffer = DepthBuffer::new(2, 2);
        buffer.test_and_set(0, 1, -0.5);
        buffer.clear(FAR_DEPTH);
        assert_relative_eq!(buffer.get(0, 1), FAR_DEPTH);
    }

    #[test]
    fn grayscale_view_normalizes_written_depths() {
        let mut buffer = DepthBuffer::new(2, 1);
        buffer.test_and_set(0, 0, 1.0); // nearest, brightest
        buffer.test_and_set(1, 0, 3.0);
        let data = buffer.as_grayscale_data();
        assert_eq!(&data[0..3], &[255, 255, 255]);
        assert_eq!(&data[3..6], &[0, 0, 0]);
    }

    #[test]
    fn color_buffer_set_overwrites_unconditionally() {
        let mut buffer = ColorBuffer::new(2, 2, vector![0.0, 0.0, 0.0]);
        buffer.set(1, 1, vector![1.0, 0.0, 0.0]);
        buffer.set(1, 1, vector![0.0, 1.0, 0.0]);
        assert_relative_eq!(buffer.get(1, 1), vector![0.0, 1.0, 0.0]);
    }

    #[test]
    fn rgb8_conversion_clamps_and_flips_rows() {
        let mut buffer = ColorBuffer::new(1, 2, vector![0.0, 0.0, 0.0]);
        buffer.set(0, 0, vector![2.0, -1.0, 0.5]); // bottom row
        let data = buffer.as_rgb8_data();
        // The bottom row lands at the end of the flat data.
        assert_eq!(&data[3..6], &[255, 0, 127]);
        assert_eq!(&data[0..3], &[0, 0, 0]);
    }
}
