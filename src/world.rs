//! World-rule layer.
//!
//! `World` owns the read-only inputs of terrain synthesis (the region
//! grid, the entropy map, and the dither table) and exposes the point
//! queries the page builder consumes. It holds no terrain itself; caching
//! of resolved cells is the page cache's job.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use glam::Vec2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::entropy::{EntropyMap, ENTROPY_CACHE_FILE, ENTROPY_SEED_FILE};
use crate::grid::Grid;
use crate::region::{Region, RegionGrid, SurfaceColor, TreeSpecies};
use crate::synth;

/// Edge of one region in world units (= cells).
pub const REGION_SIZE: usize = 64;
/// Regions per world axis.
pub const WORLD_GRID: usize = 128;
/// World edge in world units.
pub const WORLD_SIZE: usize = REGION_SIZE * WORLD_GRID;
/// Margin around a region boundary inside which neighboring regions'
/// height functions are blended.
pub const BLEND_DISTANCE: f32 = REGION_SIZE as f32 / 4.0;
/// Edge of the tiled dither table.
pub const DITHER_SIZE: usize = REGION_SIZE / 2;

/// Largest jitter applied by the dither table, in world units.
const DITHER_AMPLITUDE: i32 = 3;

/// Derive a per-system seed from the master world seed, so individual
/// systems can be varied or held constant independently.
pub fn derive_seed(master: u64, system: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    master.hash(&mut hasher);
    system.hash(&mut hasher);
    hasher.finish()
}

/// The raw synthesis values for one world coordinate, before surface
/// classification.
#[derive(Clone, Copy, Debug)]
pub struct CellSample {
    pub elevation: f32,
    pub detail: f32,
    pub water_level: f32,
}

/// Read-only world rules: region grid + entropy + dither.
pub struct World {
    seed: u64,
    regions: RegionGrid,
    entropy: EntropyMap,
    trees: Vec<TreeSpecies>,
    dither: Grid<(i32, i32)>,
}

impl World {
    pub fn new(regions: RegionGrid, trees: Vec<TreeSpecies>, entropy: EntropyMap, seed: u64) -> Self {
        Self {
            seed,
            regions,
            entropy,
            trees,
            dither: build_dither(derive_seed(seed, "dither")),
        }
    }

    /// Demo world: the stand-in region grid, a small tree table, and the
    /// entropy map loaded from (or cached into) `data_dir`.
    pub fn demo(seed: u64, data_dir: &Path) -> Self {
        let entropy = EntropyMap::open(
            &data_dir.join(ENTROPY_CACHE_FILE),
            &data_dir.join(ENTROPY_SEED_FILE),
        );
        let trees = vec![
            // Species 1: canopy tree, seeks high ground.
            TreeSpecies { grows_high: true },
            // Species 2: scrub pine, shelters low.
            TreeSpecies { grows_high: false },
            // Species 3: lone plains tree.
            TreeSpecies { grows_high: false },
        ];
        Self::new(RegionGrid::demo(seed), trees, entropy, seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn regions(&self) -> &RegionGrid {
        &self.regions
    }

    pub fn entropy(&self) -> &EntropyMap {
        &self.entropy
    }

    /// Region by grid coordinate, clamped at the world border.
    pub fn region(&self, grid_x: i32, grid_y: i32) -> &Region {
        self.regions.get(grid_x, grid_y)
    }

    /// Region owning a world position, after dither. The jitter decorrelates
    /// every per-position lookup from the region grid so straight region
    /// edges don't read through into surfaces, colors, or tree species.
    pub fn region_from_position(&self, world_x: i32, world_y: i32) -> &Region {
        let (jx, jy) = *self.dither.get_wrapped(world_x, world_y);
        self.regions.get(
            (world_x + jx).div_euclid(REGION_SIZE as i32),
            (world_y + jy).div_euclid(REGION_SIZE as i32),
        )
    }

    /// Elevation, detail, and water table at a world coordinate.
    pub fn cell_at(&self, world_x: i32, world_y: i32) -> CellSample {
        let detail = self.entropy.get(world_x, world_y);
        let pos = Vec2::new(world_x as f32, world_y as f32);
        CellSample {
            elevation: synth::elevation_at(&self.regions, pos, detail),
            detail,
            water_level: synth::water_level_at(&self.regions, pos),
        }
    }

    /// Region-weighted base color at a world coordinate, dithered.
    pub fn color_at(&self, world_x: i32, world_y: i32, channel: SurfaceColor) -> glam::Vec3 {
        let (jx, jy) = *self.dither.get_wrapped(world_x, world_y);
        synth::region_color(
            &self.regions,
            Vec2::new((world_x + jx) as f32, (world_y + jy) as f32),
            channel,
        )
    }

    /// Tree species id planted at a world coordinate (0 = none).
    pub fn tree_id_at(&self, world_x: i32, world_y: i32) -> u32 {
        self.region_from_position(world_x, world_y).tree_species
    }

    /// Species properties; None for id 0 or an id outside the table.
    pub fn tree_species(&self, id: u32) -> Option<&TreeSpecies> {
        if id == 0 {
            None
        } else {
            self.trees.get(id as usize - 1)
        }
    }
}

fn build_dither(seed: u64) -> Grid<(i32, i32)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut dither = Grid::new_with(DITHER_SIZE, DITHER_SIZE, (0, 0));
    for y in 0..DITHER_SIZE {
        for x in 0..DITHER_SIZE {
            dither.set(
                x,
                y,
                (
                    rng.gen_range(-DITHER_AMPLITUDE..=DITHER_AMPLITUDE),
                    rng.gen_range(-DITHER_AMPLITUDE..=DITHER_AMPLITUDE),
                ),
            );
        }
    }
    dither
}
