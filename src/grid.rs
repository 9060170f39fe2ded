/// A 2D grid that wraps on both axes, so maps built from it tile seamlessly.
#[derive(Clone)]
pub struct Grid<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Grid<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Build a grid from row-major data. Panics if the length doesn't match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height, "grid data length mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    /// Index into the data array, wrapping on both axes.
    fn index(&self, x: usize, y: usize) -> usize {
        (y % self.height) * self.width + (x % self.width)
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Signed-coordinate access; negative coordinates wrap like positive ones.
    pub fn get_wrapped(&self, x: i32, y: i32) -> &T {
        let wx = x.rem_euclid(self.width as i32) as usize;
        let wy = y.rem_euclid(self.height as i32) as usize;
        self.get(wx, wy)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        self.data.iter().enumerate().map(move |(idx, val)| {
            let x = idx % self.width;
            let y = idx / self.width;
            (x, y, val)
        })
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| {
            let x = idx % width;
            let y = idx / width;
            (x, y, val)
        })
    }
}

impl Grid<f32> {
    /// Sample at fractional coordinates with wraparound, using the
    /// diagonal-split quad interpolation shared by the rest of the crate.
    pub fn sample_wrapped(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let dx = x - x.floor();
        let dy = y - y.floor();

        let p00 = *self.get_wrapped(x0, y0);
        let p10 = *self.get_wrapped(x0 + 1, y0);
        let p01 = *self.get_wrapped(x0, y0 + 1);
        let p11 = *self.get_wrapped(x0 + 1, y0 + 1);

        interpolate_quad(p00, p10, p01, p11, dx, dy, true)
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for (_, _, &v) in self.iter() {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        (min, max)
    }
}

/// Interpolate inside a unit quad split into two triangles along a diagonal.
///
/// `p00` is the value at (0,0), `p10` at (1,0), `p01` at (0,1), `p11` at
/// (1,1). With `left` the diagonal runs (0,0)-(1,1) and the triangle is
/// picked by `dx < dy`; otherwise it runs (1,0)-(0,1) and is picked by
/// `dx + dy < 1`. Values along all four edges are plain linear blends, so
/// adjacent quads meet without seams regardless of their split choice.
pub fn interpolate_quad(
    p00: f32,
    p10: f32,
    p01: f32,
    p11: f32,
    dx: f32,
    dy: f32,
    left: bool,
) -> f32 {
    if left {
        if dx < dy {
            p00 + (p11 - p01) * dx + (p01 - p00) * dy
        } else {
            p00 + (p10 - p00) * dx + (p11 - p10) * dy
        }
    } else if dx + dy < 1.0 {
        p00 + (p10 - p00) * dx + (p01 - p00) * dy
    } else {
        p11 + (p01 - p11) * (1.0 - dx) + (p10 - p11) * (1.0 - dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparound_indexing() {
        let mut grid = Grid::new_with(4, 3, 0.0f32);
        grid.set(1, 2, 5.0);

        assert_eq!(*grid.get(1, 2), 5.0);
        assert_eq!(*grid.get(1 + 4, 2 + 3), 5.0);
        assert_eq!(*grid.get_wrapped(-3, -1), 5.0);
    }

    #[test]
    fn test_interpolate_quad_corners() {
        for left in [true, false] {
            assert_eq!(interpolate_quad(1.0, 2.0, 3.0, 4.0, 0.0, 0.0, left), 1.0);
            assert_eq!(interpolate_quad(1.0, 2.0, 3.0, 4.0, 1.0, 0.0, left), 2.0);
            assert_eq!(interpolate_quad(1.0, 2.0, 3.0, 4.0, 0.0, 1.0, left), 3.0);
            assert_eq!(interpolate_quad(1.0, 2.0, 3.0, 4.0, 1.0, 1.0, left), 4.0);
        }
    }

    #[test]
    fn test_interpolate_quad_edges_are_linear() {
        // Both split choices must agree along every edge of the quad, or
        // neighboring quads with different parities would show seams.
        for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
            for (dx, dy) in [(t, 0.0), (t, 1.0), (0.0, t), (1.0, t)] {
                let a = interpolate_quad(1.0, 2.0, 3.0, 4.0, dx, dy, true);
                let b = interpolate_quad(1.0, 2.0, 3.0, 4.0, dx, dy, false);
                assert!((a - b).abs() < 1e-6, "seam at ({}, {})", dx, dy);
            }
        }
    }

    #[test]
    fn test_sample_wrapped_tiles() {
        let mut grid = Grid::new_with(5, 4, 0.0f32);
        for y in 0..4 {
            for x in 0..5 {
                grid.set(x, y, (x * 7 + y * 3) as f32);
            }
        }
        let a = grid.sample_wrapped(1.3, 2.7);
        let b = grid.sample_wrapped(1.3 + 5.0, 2.7 + 4.0);
        assert!((a - b).abs() < 1e-4);
    }
}
