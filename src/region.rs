//! Region rule records.
//!
//! A `Region` is not terrain: it is the static rule set governing one cell
//! of the coarse world grid (climate, shape flags, base colors, river and
//! geo parameters). The grid is produced once per world seed and never
//! mutates afterwards; everything downstream treats it as read-only input.

use glam::Vec3;
use noise::{NoiseFn, Perlin, Seedable};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::world::{derive_seed, WORLD_GRID};

/// Climate category of a region. Drives surface classification and a few
/// height-synthesis special cases (swamps sink and flood).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Climate {
    Ocean,
    Coast,
    #[default]
    Plains,
    Forest,
    Desert,
    Mountain,
    Swamp,
    Tundra,
}

/// Bit set of region shape modifiers.
///
/// River bits may combine (a bend is N|E, a through-river is N|S, and so
/// on); the terrain modifiers are independent of each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFlags(u32);

impl ShapeFlags {
    pub const NONE: Self = Self(0);
    pub const RIVER_N: Self = Self(1 << 0);
    pub const RIVER_S: Self = Self(1 << 1);
    pub const RIVER_E: Self = Self(1 << 2);
    pub const RIVER_W: Self = Self(1 << 3);
    pub const RIVER_ANY: Self = Self(0b1111);
    pub const CRATER: Self = Self(1 << 4);
    pub const MESAS: Self = Self(1 << 5);
    pub const TIERED: Self = Self(1 << 6);
    pub const CRACK: Self = Self(1 << 7);
    pub const SINKHOLE: Self = Self(1 << 8);
    pub const CANYON_NS: Self = Self(1 << 9);
    pub const BEACH: Self = Self(1 << 10);
    pub const BEACH_CLIFF: Self = Self(1 << 11);

    /// True when every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ShapeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Which of a region's base colors a sampler wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceColor {
    Rock,
    Dirt,
    Grass,
    Sand,
    Atmosphere,
}

/// Per-species tree properties consumed by the tree-placement pass.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TreeSpecies {
    /// High-growing species plant on the tallest eligible spot in their
    /// window; the rest prefer sheltered low ground.
    pub grows_high: bool,
}

/// Static rule record for one cell of the coarse world grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    /// Position in the region grid; rivers derive their meander phase from it.
    pub grid_pos: (usize, usize),
    pub climate: Climate,
    pub shape: ShapeFlags,
    /// Overall vertical scale of this region's terrain.
    pub geo_scale: f32,
    /// Local water table elevation.
    pub geo_water: f32,
    /// Amplitude applied to the entropy detail sample.
    pub geo_detail: f32,
    /// Flat elevation offset added to every cell.
    pub geo_bias: f32,
    /// Normalized temperature, 0 = polar, 1 = equatorial.
    pub temperature: f32,
    /// Normalized moisture, 0 = arid, 1 = saturated.
    pub moisture: f32,
    /// Local relief above which surfaces classify as bare rock; also the
    /// pivot elevation for the beach / beach-cliff shapes.
    pub cliff_threshold: f32,
    pub color_rock: Vec3,
    pub color_dirt: Vec3,
    pub color_grass: Vec3,
    pub color_atmosphere: Vec3,
    /// Tree species planted here; 0 means treeless.
    pub tree_species: u32,
    pub river_id: u32,
    pub river_segment: u32,
    /// Channel width as a fraction of the region edge.
    pub river_width: f32,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            grid_pos: (0, 0),
            climate: Climate::Plains,
            shape: ShapeFlags::NONE,
            geo_scale: 1.0,
            geo_water: 0.0,
            geo_detail: 4.0,
            geo_bias: 2.0,
            temperature: 0.6,
            moisture: 0.5,
            cliff_threshold: 4.0,
            color_rock: Vec3::new(0.5, 0.48, 0.45),
            color_dirt: Vec3::new(0.45, 0.33, 0.2),
            color_grass: Vec3::new(0.25, 0.52, 0.2),
            color_atmosphere: Vec3::new(0.6, 0.7, 0.9),
            tree_species: 0,
            river_id: 0,
            river_segment: 0,
            river_width: 0.1,
        }
    }
}

impl Region {
    /// Look up one of the four base colors. Sand is a world-wide constant
    /// and Atmosphere is only used by out-of-scope sky rendering, but both
    /// route through here so every sampler shares one code path.
    pub fn color(&self, channel: SurfaceColor) -> Vec3 {
        match channel {
            SurfaceColor::Rock => self.color_rock,
            SurfaceColor::Dirt => self.color_dirt,
            SurfaceColor::Grass => self.color_grass,
            SurfaceColor::Sand => Vec3::new(0.94, 0.86, 0.64),
            SurfaceColor::Atmosphere => self.color_atmosphere,
        }
    }

    pub fn has_river(&self) -> bool {
        self.shape.intersects(ShapeFlags::RIVER_ANY)
    }
}

/// The fixed `WORLD_GRID x WORLD_GRID` array of region rules.
///
/// Produced by the terraforming pass (outside this crate) or by the small
/// demo builder below; read-only afterwards.
#[derive(Clone)]
pub struct RegionGrid {
    grid: Grid<Region>,
}

impl RegionGrid {
    /// Build from a closure, row-major over the whole grid.
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> Region) -> Self {
        let mut grid = Grid::new(WORLD_GRID, WORLD_GRID);
        for y in 0..WORLD_GRID {
            for x in 0..WORLD_GRID {
                let mut region = f(x, y);
                region.grid_pos = (x, y);
                grid.set(x, y, region);
            }
        }
        Self { grid }
    }

    /// Every region identical except for its grid position. Test worlds use
    /// this to isolate single-region behavior.
    pub fn uniform(template: Region) -> Self {
        Self::from_fn(|_, _| template.clone())
    }

    /// Clamped lookup; coordinates outside the grid return the border region.
    pub fn get(&self, x: i32, y: i32) -> &Region {
        let cx = x.clamp(0, WORLD_GRID as i32 - 1) as usize;
        let cy = y.clamp(0, WORLD_GRID as i32 - 1) as usize;
        self.grid.get(cx, cy)
    }

    /// A small seeded stand-in for the terraforming pass, so the CLI and the
    /// integration tests have a world to page. Climate comes from two
    /// low-frequency noise fields (elevation-ish and moisture) plus a
    /// latitude temperature gradient; a handful of columns get N/S rivers.
    pub fn demo(seed: u64) -> Self {
        let elevation_noise = Perlin::new(1).set_seed(derive_seed(seed, "demo-elevation") as u32);
        let moisture_noise = Perlin::new(1).set_seed(derive_seed(seed, "demo-moisture") as u32);
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, "demo-rules"));

        Self::from_fn(|x, y| {
            let nx = x as f64 / WORLD_GRID as f64;
            let ny = y as f64 / WORLD_GRID as f64;

            let elev = elevation_noise.get([nx * 4.0, ny * 4.0]) as f32;
            let moisture =
                (moisture_noise.get([nx * 6.0 + 31.0, ny * 6.0]) as f32 * 0.5 + 0.5).clamp(0.0, 1.0);
            // Warm at the map equator, cold at the top and bottom edges.
            let latitude = (ny as f32 - 0.5).abs() * 2.0;
            let temperature = (1.0 - latitude * 1.2 + elev * -0.2).clamp(0.0, 1.0);

            let climate = if elev < -0.35 {
                Climate::Ocean
            } else if elev < -0.25 {
                Climate::Coast
            } else if temperature < 0.15 {
                Climate::Tundra
            } else if elev > 0.45 {
                Climate::Mountain
            } else if moisture > 0.75 && temperature > 0.5 && elev < 0.0 {
                Climate::Swamp
            } else if moisture < 0.25 {
                Climate::Desert
            } else if moisture > 0.55 {
                Climate::Forest
            } else {
                Climate::Plains
            };

            let jitter = |rng: &mut ChaCha8Rng| rng.gen_range(-0.04..0.04f32);

            let mut region = Region {
                climate,
                geo_water: (elev.min(0.0)) * 24.0,
                geo_bias: elev.max(0.0) * 30.0,
                ..Region::default()
            };
            region.geo_detail = match climate {
                Climate::Mountain => 14.0,
                Climate::Ocean | Climate::Coast => 2.0,
                Climate::Swamp => 1.5,
                _ => 5.0,
            };
            region.geo_scale = region.geo_detail / 8.0;
            region.temperature = temperature;
            region.moisture = moisture;
            region.cliff_threshold = match climate {
                Climate::Mountain => 3.0,
                _ => 5.0,
            };
            region.color_grass += Vec3::splat(jitter(&mut rng));
            region.color_dirt += Vec3::splat(jitter(&mut rng));
            region.color_rock += Vec3::splat(jitter(&mut rng));
            region.tree_species = match climate {
                Climate::Forest => 1,
                Climate::Tundra | Climate::Mountain => 2,
                Climate::Plains => 3,
                _ => 0,
            };

            // Sparse meandering north-south rivers through the wet lowlands.
            // Both rolls are drawn for every region so the stream stays
            // aligned no matter which climates surround a column.
            let river_roll = rng.gen_bool(0.35);
            let river_width = rng.gen_range(0.06..0.14);
            let wet_lowland = climate == Climate::Plains || climate == Climate::Forest;
            if wet_lowland && x % 17 == 5 && river_roll {
                region.shape.insert(ShapeFlags::RIVER_N | ShapeFlags::RIVER_S);
                region.river_id = (x / 17 + 1) as u32;
                region.river_segment = y as u32;
                region.river_width = river_width;
            }

            region
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_flags() {
        let mut flags = ShapeFlags::NONE;
        assert!(flags.is_empty());

        flags.insert(ShapeFlags::RIVER_N | ShapeFlags::RIVER_E);
        assert!(flags.intersects(ShapeFlags::RIVER_ANY));
        assert!(flags.contains(ShapeFlags::RIVER_N));
        assert!(!flags.contains(ShapeFlags::RIVER_ANY));
        assert!(!flags.intersects(ShapeFlags::CRATER));
    }

    #[test]
    fn test_demo_grid_deterministic() {
        let a = RegionGrid::demo(99);
        let b = RegionGrid::demo(99);
        for y in 0..WORLD_GRID as i32 {
            for x in 0..WORLD_GRID as i32 {
                let ra = a.get(x, y);
                let rb = b.get(x, y);
                assert_eq!(ra.climate, rb.climate);
                assert_eq!(ra.shape, rb.shape);
                assert_eq!(ra.geo_detail, rb.geo_detail);
                assert_eq!(ra.color_grass, rb.color_grass);
            }
        }
    }

    #[test]
    fn test_region_grid_clamps() {
        let grid = RegionGrid::demo(7);
        assert_eq!(grid.get(-5, -5).grid_pos, (0, 0));
        assert_eq!(
            grid.get(WORLD_GRID as i32 + 10, 3).grid_pos,
            (WORLD_GRID - 1, 3)
        );
    }
}
