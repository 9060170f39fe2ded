//! Erosion-simulated entropy map.
//!
//! A single global grid of floats in [0,1] that supplies the fine "detail"
//! values for height synthesis. It is built once from a seed bitmap by
//! running a raindrop-style erosion pass and a smoothing pass, then cached
//! to a flat binary file so later runs skip the simulation. The grid wraps
//! on both axes so it tiles seamlessly; its dimensions are taken from the
//! seed bitmap and are deliberately not a power of two, which keeps the
//! tiling from lining up with the page grid.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use noise::{NoiseFn, Perlin, Seedable};
use rayon::prelude::*;

use crate::grid::Grid;

/// Default on-disk cache of the finished map.
pub const ENTROPY_CACHE_FILE: &str = "entropy.raw";
/// Seed bitmap the simulation starts from (red channel).
pub const ENTROPY_SEED_FILE: &str = "entropy_seed.png";

/// Full raindrop passes over the grid.
const RAIN_PASSES: usize = 3;
/// Elevation multiplier applied at every step of a raindrop path.
const EROSION_FACTOR: f32 = 0.97;
/// Extra multiplier when the path point is also a local maximum, filing
/// down single-cell spikes.
const SPIKE_FACTOR: f32 = 0.95;
/// Neighborhood radius of the smoothing pass.
const BLUR_RADIUS: i32 = 3;

/// Upper bound accepted from a cache file header; anything larger is
/// treated as corruption.
const MAX_MAP_EDGE: i32 = 16_384;

/// The global entropy map. Constructed explicitly and owned by the world
/// object; immutable once loaded. When no seed data could be found the map
/// stays unset and every query returns 0.
pub struct EntropyMap {
    grid: Option<Grid<f32>>,
}

impl EntropyMap {
    /// An empty map; every query returns 0.
    pub fn unloaded() -> Self {
        Self { grid: None }
    }

    /// Use an already-normalized grid as the map, bypassing generation.
    pub fn from_grid(grid: Grid<f32>) -> Self {
        Self { grid: Some(grid) }
    }

    /// Load the map, preferring the binary cache, falling back to running
    /// the erosion simulation on the seed bitmap. Either file being absent
    /// or unreadable is non-fatal: the cache miss falls through to
    /// generation, and a missing bitmap leaves the map unset.
    pub fn open(cache_path: &Path, seed_path: &Path) -> Self {
        match read_raw(cache_path) {
            Ok(grid) => {
                println!(
                    "Entropy: loaded {}x{} map from {}",
                    grid.width,
                    grid.height,
                    cache_path.display()
                );
                return Self { grid: Some(grid) };
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => eprintln!(
                "Warning: entropy cache {} unreadable ({}), regenerating",
                cache_path.display(),
                e
            ),
        }

        let seed = match load_seed_bitmap(seed_path) {
            Ok(grid) => grid,
            Err(e) => {
                eprintln!(
                    "Warning: entropy seed bitmap {} unavailable ({}); entropy disabled",
                    seed_path.display(),
                    e
                );
                return Self::unloaded();
            }
        };

        let grid = generate(seed);
        if let Err(e) = write_raw(cache_path, &grid) {
            eprintln!(
                "Warning: failed to write entropy cache {}: {}",
                cache_path.display(),
                e
            );
        }
        Self { grid: Some(grid) }
    }

    pub fn is_loaded(&self) -> bool {
        self.grid.is_some()
    }

    /// (width, height), or None when unset.
    pub fn size(&self) -> Option<(usize, usize)> {
        self.grid.as_ref().map(|g| (g.width, g.height))
    }

    /// Entropy at integer coordinates, wrapping on both axes.
    pub fn get(&self, x: i32, y: i32) -> f32 {
        match &self.grid {
            Some(grid) => *grid.get_wrapped(x, y),
            None => 0.0,
        }
    }

    /// Entropy at fractional coordinates, interpolated and wrapping.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        match &self.grid {
            Some(grid) => grid.sample_wrapped(x, y),
            None => 0.0,
        }
    }
}

/// Run the full erosion pipeline on a seed grid: raindrop passes, blur,
/// renormalize to [0,1].
pub fn generate(mut grid: Grid<f32>) -> Grid<f32> {
    for _ in 0..RAIN_PASSES {
        raindrop_pass(&mut grid);
    }
    let mut grid = blur(&grid);
    renormalize(&mut grid);
    grid
}

/// One raindrop pass. From every cell, trace a path that repeatedly hops to
/// the lowest of the surrounding 3x3 cells until no strictly lower neighbor
/// exists, eroding the scratch copy at every point visited. Heights are read
/// from the unmodified input for the whole pass, so the path for each cell
/// is independent of iteration order; the scratch is copied back at the end.
fn raindrop_pass(grid: &mut Grid<f32>) {
    let mut scratch = grid.clone();

    for y in 0..grid.height as i32 {
        for x in 0..grid.width as i32 {
            let mut cx = x;
            let mut cy = y;

            loop {
                let center = *grid.get_wrapped(cx, cy);
                let mut lowest = center;
                let mut low_pos = (cx, cy);
                let mut highest_neighbor = f32::MIN;

                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let v = *grid.get_wrapped(cx + dx, cy + dy);
                        if v < lowest {
                            lowest = v;
                            low_pos = (cx + dx, cy + dy);
                        }
                        if v > highest_neighbor {
                            highest_neighbor = v;
                        }
                    }
                }

                let mut factor = EROSION_FACTOR;
                if center >= highest_neighbor {
                    factor *= SPIKE_FACTOR;
                }
                *scratch.get_mut(
                    cx.rem_euclid(grid.width as i32) as usize,
                    cy.rem_euclid(grid.height as i32) as usize,
                ) *= factor;

                if low_pos == (cx, cy) {
                    break;
                }
                (cx, cy) = low_pos;
            }
        }
    }

    *grid = scratch;
}

/// Box-average every cell over a (2r+1)^2 wraparound neighborhood. The
/// averaged value replaces the cell outright; the half-blend the original
/// computed was immediately discarded by its own final assignment, and the
/// overwrite is what observed output matched (see DESIGN.md).
fn blur(grid: &Grid<f32>) -> Grid<f32> {
    let width = grid.width;
    let height = grid.height;
    let window = (BLUR_RADIUS * 2 + 1).pow(2) as f32;

    let data: Vec<f32> = (0..height as i32)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..width as i32).map(move |x| {
                let mut sum = 0.0;
                for dy in -BLUR_RADIUS..=BLUR_RADIUS {
                    for dx in -BLUR_RADIUS..=BLUR_RADIUS {
                        sum += *grid.get_wrapped(x + dx, y + dy);
                    }
                }
                sum / window
            })
        })
        .collect();

    Grid::from_vec(width, height, data)
}

/// Remap the whole grid linearly onto [0,1].
fn renormalize(grid: &mut Grid<f32>) {
    let (min, max) = grid.min_max();
    let range = max - min;
    if range <= f32::EPSILON {
        grid.fill(0.0);
        return;
    }
    for (_, _, v) in grid.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Read a persisted map: `[width: i32][height: i32][f32 * w * h]`,
/// little-endian, row-major.
fn read_raw(path: &Path) -> io::Result<Grid<f32>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    let width = i32::from_le_bytes(word);
    reader.read_exact(&mut word)?;
    let height = i32::from_le_bytes(word);

    if width <= 0 || height <= 0 || width > MAX_MAP_EDGE || height > MAX_MAP_EDGE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("implausible entropy map size {}x{}", width, height),
        ));
    }

    let count = width as usize * height as usize;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        reader.read_exact(&mut word)?;
        data.push(f32::from_le_bytes(word));
    }

    Ok(Grid::from_vec(width as usize, height as usize, data))
}

/// Write the map in the same raw format.
fn write_raw(path: &Path, grid: &Grid<f32>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&(grid.width as i32).to_le_bytes())?;
    writer.write_all(&(grid.height as i32).to_le_bytes())?;
    for (_, _, v) in grid.iter() {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()
}

/// Load the seed bitmap, taking the red channel as a normalized float grid.
pub fn load_seed_bitmap(path: &Path) -> io::Result<Grid<f32>> {
    let img = image::open(path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
        .into_rgb8();

    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
    Ok(Grid::from_vec(width, height, data))
}

/// Write a Perlin fBm seed bitmap, for bootstrapping a fresh install that
/// ships without one. Deliberately odd dimensions keep the finished map
/// from tiling in sync with the page grid.
pub fn generate_seed_image(path: &Path, width: u32, height: u32, seed: u64) -> io::Result<()> {
    let perlin = Perlin::new(1).set_seed(seed as u32);

    let img = image::GrayImage::from_fn(width, height, |x, y| {
        let nx = x as f64 / width as f64;
        let ny = y as f64 / height as f64;
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 4.0;
        let mut max_value = 0.0;
        for _ in 0..5 {
            total += amplitude * perlin.get([nx * frequency, ny * frequency]);
            max_value += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }
        let v = (total / max_value * 0.5 + 0.5).clamp(0.0, 1.0);
        image::Luma([(v * 255.0) as u8])
    });

    img.save(path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_seed_grid(width: usize, height: usize) -> Grid<f32> {
        let mut grid = Grid::new_with(width, height, 0.0f32);
        for y in 0..height {
            for x in 0..width {
                // Deterministic bumpy pattern with a clear spike.
                let v = ((x * 31 + y * 17) % 97) as f32 / 97.0;
                grid.set(x, y, v);
            }
        }
        grid.set(width / 2, height / 2, 1.0);
        grid
    }

    #[test]
    fn test_generate_normalized_and_tiling() {
        let map = EntropyMap::from_grid(generate(test_seed_grid(37, 29)));

        for y in 0..29 {
            for x in 0..37 {
                let v = map.get(x, y);
                assert!((0.0..=1.0).contains(&v), "value {} out of range", v);
                // Wraparound invariant on both axes.
                assert_eq!(v, map.get(x + 37, y));
                assert_eq!(v, map.get(x, y + 29));
                assert_eq!(v, map.get(x - 37, y - 29));
            }
        }
    }

    #[test]
    fn test_generate_deterministic() {
        let a = generate(test_seed_grid(24, 18));
        let b = generate(test_seed_grid(24, 18));
        for (x, y, &v) in a.iter() {
            assert_eq!(v, *b.get(x, y));
        }
    }

    #[test]
    fn test_unloaded_returns_zero() {
        let map = EntropyMap::unloaded();
        assert!(!map.is_loaded());
        assert_eq!(map.get(5, 9), 0.0);
        assert_eq!(map.sample(1.5, 2.5), 0.0);
    }

    #[test]
    fn test_raw_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ENTROPY_CACHE_FILE);

        let grid = generate(test_seed_grid(19, 13));
        write_raw(&path, &grid).unwrap();

        let loaded = read_raw(&path).unwrap();
        assert_eq!(loaded.width, 19);
        assert_eq!(loaded.height, 13);
        for (x, y, &v) in grid.iter() {
            assert_eq!(v, *loaded.get(x, y));
        }
    }

    #[test]
    fn test_open_falls_back_to_bitmap_then_caches() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join(ENTROPY_CACHE_FILE);
        let seed = dir.path().join(ENTROPY_SEED_FILE);
        generate_seed_image(&seed, 23, 17, 42).unwrap();

        let first = EntropyMap::open(&cache, &seed);
        assert!(first.is_loaded());
        assert!(cache.exists());

        // Second open must hit the cache and agree exactly.
        let second = EntropyMap::open(&cache, &seed);
        assert_eq!(first.size(), second.size());
        for y in 0..17 {
            for x in 0..23 {
                assert_eq!(first.get(x, y), second.get(x, y));
            }
        }
    }

    #[test]
    fn test_corrupt_cache_is_nonfatal() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join(ENTROPY_CACHE_FILE);
        std::fs::write(&cache, b"not a map").unwrap();

        let seed = dir.path().join(ENTROPY_SEED_FILE);
        generate_seed_image(&seed, 11, 9, 7).unwrap();

        let map = EntropyMap::open(&cache, &seed);
        assert!(map.is_loaded());
    }

    #[test]
    fn test_missing_everything_leaves_map_unset() {
        let dir = tempdir().unwrap();
        let map = EntropyMap::open(
            &dir.path().join(ENTROPY_CACHE_FILE),
            &dir.path().join(ENTROPY_SEED_FILE),
        );
        assert!(!map.is_loaded());
        assert_eq!(map.get(0, 0), 0.0);
    }
}
