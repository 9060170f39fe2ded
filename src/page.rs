//! Cache pages: fixed-size tiles of fully resolved terrain.
//!
//! A page is built through a strictly ordered sequence of stages, each of
//! which walks the cell array behind a persistent cursor. `build` resumes
//! wherever the previous call left off and returns as soon as its deadline
//! passes, so the expensive fill work slices cleanly into a frame budget.
//! Queries are legal at any stage and read whatever the cells currently
//! hold; only `is_ready` distinguishes a finished page.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::region::{Climate, Region, SurfaceColor};
use crate::world::World;

/// Page edge in cells.
pub const PAGE_SIZE: usize = 128;
/// Edge of one coarse tree-placement cell.
pub const TREE_SPACING: usize = 8;

/// Relaxation applied to the z component of surface normals before
/// normalizing; lower values exaggerate relief shading.
const NORMAL_SCALING: f32 = 0.25;
/// A page will not rewrite its file more often than this.
const SAVE_COOLDOWN: Duration = Duration::from_secs(10);

/// Band above the local water table that classifies as wet sand.
const SAND_MARGIN: f32 = 0.5;
/// Normalized region temperature below which snow starts to accumulate.
const FREEZING_POINT: f32 = 0.3;
/// Snow cover threshold: cells whiten when temperature deficit times
/// (1 - detail) exceeds this.
const SNOW_COVER: f32 = 0.25;
/// Regions drier than this lose their grass.
const MOISTURE_DRY: f32 = 0.2;
/// Trees refuse ground closer to the water table than this.
const TREE_WATER_MARGIN: f32 = 1.2;
/// Minimum detail (soil depth, loosely) for a planting spot.
const TREE_DETAIL_MIN: f32 = 0.3;

/// Surface classification of one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Surface {
    /// Unresolved; also the sentinel for queries outside the live world.
    #[default]
    Null,
    Grass,
    GrassEdge,
    Rock,
    Sand,
    Forest,
    Dirt,
    DirtDark,
    Snow,
}

/// One fully resolved terrain sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub elevation: f32,
    pub detail: f32,
    pub water_level: f32,
    pub surface: Surface,
    pub color: Vec3,
    pub normal: Vec3,
    /// Tree species planted on this cell; 0 = none.
    pub tree_id: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            elevation: 0.0,
            detail: 0.0,
            water_level: 0.0,
            surface: Surface::Null,
            color: Vec3::ZERO,
            normal: Vec3::Z,
            tree_id: 0,
        }
    }
}

/// Build stages, in execution order. Transitions go through `next` only;
/// there is no ordinal arithmetic to silently break if a stage is ever
/// added or reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Begin,
    Position,
    Normal,
    Surface1,
    Surface2,
    Color,
    Trees,
    Save,
    Done,
}

impl Stage {
    pub fn next(self) -> Self {
        match self {
            Stage::Begin => Stage::Position,
            Stage::Position => Stage::Normal,
            Stage::Normal => Stage::Surface1,
            Stage::Surface1 => Stage::Surface2,
            Stage::Surface2 => Stage::Color,
            Stage::Color => Stage::Trees,
            Stage::Trees => Stage::Save,
            Stage::Save => Stage::Done,
            Stage::Done => Stage::Done,
        }
    }

    /// Cursor span: cell stages walk the full page, tree placement walks
    /// the coarse grid.
    fn span(self) -> usize {
        match self {
            Stage::Trees => PAGE_SIZE / TREE_SPACING,
            _ => PAGE_SIZE,
        }
    }
}

/// World-space bounding box accumulated while positions are filled in.
#[derive(Clone, Copy, Debug)]
pub struct PageBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl PageBounds {
    fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    fn add(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

/// A `PAGE_SIZE x PAGE_SIZE` tile of cells plus its build state.
pub struct CachePage {
    origin: (usize, usize),
    cells: Vec<Cell>,
    stage: Stage,
    cursor: (usize, usize),
    bounds: PageBounds,
    last_touched: Instant,
    last_saved: Option<Instant>,
}

impl CachePage {
    /// Fresh page, nothing resolved yet.
    pub fn new(page_x: usize, page_y: usize) -> Self {
        Self {
            origin: (page_x, page_y),
            cells: vec![Cell::default(); PAGE_SIZE * PAGE_SIZE],
            stage: Stage::Begin,
            cursor: (0, 0),
            bounds: PageBounds::empty(),
            last_touched: Instant::now(),
            last_saved: None,
        }
    }

    /// Reconstruct a page from persisted cells; it is immediately ready.
    pub fn from_cells(page_x: usize, page_y: usize, cells: Vec<Cell>) -> Self {
        let mut page = Self {
            origin: (page_x, page_y),
            cells,
            stage: Stage::Done,
            cursor: (0, 0),
            bounds: PageBounds::empty(),
            last_touched: Instant::now(),
            last_saved: Some(Instant::now()),
        };
        for y in 0..PAGE_SIZE {
            for x in 0..PAGE_SIZE {
                let world = page.world_pos(x, y);
                let elevation = page.cells[y * PAGE_SIZE + x].elevation;
                page.bounds.add(Vec3::new(world.0 as f32, world.1 as f32, elevation));
            }
        }
        page
    }

    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_ready(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn bounds(&self) -> PageBounds {
        self.bounds
    }

    /// Time since the last query or build touched this page.
    pub fn idle(&self) -> Duration {
        self.last_touched.elapsed()
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    /// Read a cell (local coordinates, caller keeps them inside the page).
    /// Counts as a touch for eviction purposes.
    pub fn cell(&mut self, local_x: usize, local_y: usize) -> &Cell {
        self.touch();
        &self.cells[local_y * PAGE_SIZE + local_x]
    }

    /// The full cell array, for serialization and diagnostics.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    fn world_pos(&self, local_x: usize, local_y: usize) -> (i32, i32) {
        (
            (self.origin.0 * PAGE_SIZE + local_x) as i32,
            (self.origin.1 * PAGE_SIZE + local_y) as i32,
        )
    }

    /// Advance the build by as much as fits before `deadline`. At least one
    /// cell of progress is made per call, so a caller whose budget is
    /// already exhausted still converges; there is no cancellation finer
    /// than one cell.
    pub fn build(&mut self, world: &World, store: &PageStore, deadline: Instant) {
        self.touch();
        let mut stepped = false;
        while self.stage != Stage::Done {
            match self.stage {
                Stage::Begin => {
                    self.cursor = (0, 0);
                    self.bounds = PageBounds::empty();
                    self.stage = self.stage.next();
                }
                Stage::Save => {
                    self.save(store);
                    self.stage = self.stage.next();
                }
                _ => {
                    if stepped && Instant::now() >= deadline {
                        return;
                    }
                    self.step_cell(world);
                    stepped = true;
                }
            }
        }
    }

    /// Persist through `store`, honoring the save cooldown. Failures are
    /// logged and otherwise ignored; the page simply rebuilds next session.
    pub fn save(&mut self, store: &PageStore) {
        if !store.is_enabled() {
            return;
        }
        if let Some(saved) = self.last_saved {
            if saved.elapsed() < SAVE_COOLDOWN {
                return;
            }
        }
        match store.save(self) {
            Ok(()) => self.last_saved = Some(Instant::now()),
            Err(e) => eprintln!(
                "Warning: failed to save page ({}, {}): {}",
                self.origin.0, self.origin.1, e
            ),
        }
    }

    /// Do one unit of work at the cursor, then advance it; a cursor wrap
    /// completes the stage.
    fn step_cell(&mut self, world: &World) {
        let (x, y) = self.cursor;
        match self.stage {
            Stage::Position => self.fill_position(world, x, y),
            Stage::Normal => self.fill_normal(x, y),
            Stage::Surface1 => self.fill_surface(world, x, y),
            Stage::Surface2 => self.fill_grass_edge(x, y),
            Stage::Color => self.fill_color(world, x, y),
            Stage::Trees => self.plant_tree(world, x, y),
            _ => {}
        }

        let span = self.stage.span();
        self.cursor.0 += 1;
        if self.cursor.0 >= span {
            self.cursor.0 = 0;
            self.cursor.1 += 1;
        }
        if self.cursor.1 >= span {
            self.cursor = (0, 0);
            self.stage = self.stage.next();
        }
    }

    fn fill_position(&mut self, world: &World, x: usize, y: usize) {
        let (wx, wy) = self.world_pos(x, y);
        let sample = world.cell_at(wx, wy);
        let cell = &mut self.cells[y * PAGE_SIZE + x];
        cell.elevation = sample.elevation;
        cell.detail = sample.detail;
        cell.water_level = sample.water_level;
        cell.tree_id = 0;
        self.bounds
            .add(Vec3::new(wx as f32, wy as f32, sample.elevation));
    }

    fn elevation_clamped(&self, x: i32, y: i32) -> f32 {
        let cx = x.clamp(0, PAGE_SIZE as i32 - 1) as usize;
        let cy = y.clamp(0, PAGE_SIZE as i32 - 1) as usize;
        self.cells[cy * PAGE_SIZE + cx].elevation
    }

    fn fill_normal(&mut self, x: usize, y: usize) {
        let xi = x as i32;
        let yi = y as i32;
        // Central difference; index clamping degrades to a one-sided
        // difference at the page border, leaving an edge-facing normal.
        let dx = self.elevation_clamped(xi + 1, yi) - self.elevation_clamped(xi - 1, yi);
        let dy = self.elevation_clamped(xi, yi + 1) - self.elevation_clamped(xi, yi - 1);
        let mut normal = Vec3::new(2.0, 0.0, dx).cross(Vec3::new(0.0, 2.0, dy));
        normal.z *= NORMAL_SCALING;
        self.cells[y * PAGE_SIZE + x].normal = normal.normalize();
    }

    /// Local elevation range over the 5x5 neighborhood, clamped at the
    /// page border.
    fn relief(&self, x: i32, y: i32) -> f32 {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for dy in -2..=2 {
            for dx in -2..=2 {
                let e = self.elevation_clamped(x + dx, y + dy);
                min = min.min(e);
                max = max.max(e);
            }
        }
        max - min
    }

    fn fill_surface(&mut self, world: &World, x: usize, y: usize) {
        let (wx, wy) = self.world_pos(x, y);
        let relief = self.relief(x as i32, y as i32);
        let region = world.region_from_position(wx, wy);
        let cell = self.cells[y * PAGE_SIZE + x];
        self.cells[y * PAGE_SIZE + x].surface = classify(region, &cell, relief);
    }

    /// Turn interior grass cells that touch any non-grass neighbor into the
    /// edge variant. Converted cells still count as grass for their own
    /// neighbors, so the pass doesn't cascade.
    fn fill_grass_edge(&mut self, x: usize, y: usize) {
        if x == 0 || y == 0 || x == PAGE_SIZE - 1 || y == PAGE_SIZE - 1 {
            return;
        }
        if self.cells[y * PAGE_SIZE + x].surface != Surface::Grass {
            return;
        }
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                let neighbor = self.cells[ny * PAGE_SIZE + nx].surface;
                if neighbor != Surface::Grass && neighbor != Surface::GrassEdge {
                    self.cells[y * PAGE_SIZE + x].surface = Surface::GrassEdge;
                    return;
                }
            }
        }
    }

    fn fill_color(&mut self, world: &World, x: usize, y: usize) {
        let (wx, wy) = self.world_pos(x, y);
        let surface = self.cells[y * PAGE_SIZE + x].surface;
        let color = match surface {
            Surface::Grass => world.color_at(wx, wy, SurfaceColor::Grass),
            Surface::GrassEdge => world.color_at(wx, wy, SurfaceColor::Grass) * 0.8,
            Surface::Forest => world.color_at(wx, wy, SurfaceColor::Grass) * 0.6,
            Surface::Dirt => world.color_at(wx, wy, SurfaceColor::Dirt),
            Surface::DirtDark => world.color_at(wx, wy, SurfaceColor::Dirt) * 0.5,
            Surface::Sand => world.color_at(wx, wy, SurfaceColor::Sand),
            Surface::Rock => world.color_at(wx, wy, SurfaceColor::Rock),
            Surface::Snow => Vec3::ONE,
            Surface::Null => Vec3::new(1.0, 0.0, 1.0),
        };
        self.cells[y * PAGE_SIZE + x].color = color;
    }

    /// Pick at most one planting spot inside this coarse cell: the best
    /// eligible cell in a window inset one cell from the coarse boundary.
    /// High-growing species take the highest eligible ground, the rest the
    /// lowest.
    fn plant_tree(&mut self, world: &World, coarse_x: usize, coarse_y: usize) {
        let base_x = coarse_x * TREE_SPACING;
        let base_y = coarse_y * TREE_SPACING;
        let (wcx, wcy) = self.world_pos(base_x + TREE_SPACING / 2, base_y + TREE_SPACING / 2);

        let species_id = world.tree_id_at(wcx, wcy);
        let species = match world.tree_species(species_id) {
            Some(species) => *species,
            None => return,
        };

        let mut best: Option<(usize, f32)> = None;
        for y in (base_y + 1)..(base_y + TREE_SPACING - 1) {
            for x in (base_x + 1)..(base_x + TREE_SPACING - 1) {
                let cell = &self.cells[y * PAGE_SIZE + x];
                let plantable = matches!(
                    cell.surface,
                    Surface::Grass | Surface::GrassEdge | Surface::Snow | Surface::Forest
                );
                if !plantable
                    || cell.elevation < cell.water_level + TREE_WATER_MARGIN
                    || cell.detail <= TREE_DETAIL_MIN
                {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((_, e)) => {
                        if species.grows_high {
                            cell.elevation > e
                        } else {
                            cell.elevation < e
                        }
                    }
                };
                if better {
                    best = Some((y * PAGE_SIZE + x, cell.elevation));
                }
            }
        }

        if let Some((idx, _)) = best {
            self.cells[idx].tree_id = species_id;
        }
    }
}

/// Surface decision cascade: relief first, then the waterline, then
/// climate-driven cover.
fn classify(region: &Region, cell: &Cell, relief: f32) -> Surface {
    if relief > region.cliff_threshold {
        return Surface::Rock;
    }
    if cell.elevation < cell.water_level + SAND_MARGIN {
        return Surface::Sand;
    }
    if region.temperature < FREEZING_POINT {
        let deficit = 1.0 - region.temperature / FREEZING_POINT;
        if deficit * (1.0 - cell.detail) > SNOW_COVER {
            return Surface::Snow;
        }
    }
    match region.climate {
        Climate::Desert => {
            if cell.detail < 0.3 {
                Surface::Sand
            } else {
                Surface::Dirt
            }
        }
        Climate::Swamp => {
            if cell.elevation < cell.water_level + 1.0 {
                Surface::DirtDark
            } else {
                Surface::Grass
            }
        }
        Climate::Forest => {
            if cell.detail > 0.25 {
                Surface::Forest
            } else {
                Surface::Grass
            }
        }
        _ => {
            if region.moisture > 0.6 && cell.detail > 0.6 {
                Surface::Forest
            } else if region.moisture < MOISTURE_DRY {
                if cell.detail < 0.3 {
                    Surface::DirtDark
                } else {
                    Surface::Dirt
                }
            } else {
                Surface::Grass
            }
        }
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

const PAGE_MAGIC: u32 = 0x7061_6731; // "pag1"
const PAGE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PageBlob {
    magic: u32,
    version: u32,
    page_x: u32,
    page_y: u32,
    cells: Vec<Cell>,
}

/// Disk backing for pages: one `cache{X}-{Y}.pag` file per page under a
/// flat directory. The directory must exist before the first save; that is
/// the caller's responsibility.
pub struct PageStore {
    dir: PathBuf,
    enabled: bool,
}

impl PageStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            enabled: true,
        }
    }

    /// A store that drops every save and loads nothing; pages live purely
    /// in memory.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn page_path(&self, page_x: usize, page_y: usize) -> PathBuf {
        self.dir.join(format!("cache{}-{}.pag", page_x, page_y))
    }

    pub fn save(&self, page: &CachePage) -> Result<(), PageStoreError> {
        let (px, py) = page.origin();
        let file = File::create(self.page_path(px, py))?;
        let writer = BufWriter::new(file);
        let blob = PageBlob {
            magic: PAGE_MAGIC,
            version: PAGE_VERSION,
            page_x: px as u32,
            page_y: py as u32,
            cells: page.cells().to_vec(),
        };
        bincode::serialize_into(writer, &blob)
            .map_err(|e| PageStoreError::Serialization(e.to_string()))
    }

    /// Load the cells for a page. `Ok(None)` means no file exists (or the
    /// store is disabled); a corrupt or mismatched file is an error the
    /// caller downgrades to "missing".
    pub fn load(&self, page_x: usize, page_y: usize) -> Result<Option<Vec<Cell>>, PageStoreError> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.page_path(page_x, page_y);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let blob: PageBlob = bincode::deserialize_from(reader)
            .map_err(|e| PageStoreError::Deserialization(e.to_string()))?;

        if blob.magic != PAGE_MAGIC || blob.version != PAGE_VERSION {
            return Err(PageStoreError::Deserialization(format!(
                "bad header {:08x}/{}",
                blob.magic, blob.version
            )));
        }
        if blob.page_x as usize != page_x
            || blob.page_y as usize != page_y
            || blob.cells.len() != PAGE_SIZE * PAGE_SIZE
        {
            return Err(PageStoreError::Deserialization(
                "page payload does not match its coordinate".to_string(),
            ));
        }
        Ok(Some(blob.cells))
    }

    pub fn delete(&self, page_x: usize, page_y: usize) -> std::io::Result<()> {
        let path = self.page_path(page_x, page_y);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Delete every page file in the store directory. Returns how many were
    /// removed; a missing directory counts as empty.
    pub fn clear(&self) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("cache") && name.ends_with(".pag") {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Errors from page persistence.
#[derive(Debug)]
pub enum PageStoreError {
    /// IO error (permissions, missing directory, etc.)
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
    /// Deserialization error (corrupted file, version mismatch, etc.)
    Deserialization(String),
}

impl std::fmt::Display for PageStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageStoreError::Io(e) => write!(f, "IO error: {}", e),
            PageStoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PageStoreError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
        }
    }
}

impl std::error::Error for PageStoreError {}

impl From<std::io::Error> for PageStoreError {
    fn from(e: std::io::Error) -> Self {
        PageStoreError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::EntropyMap;
    use crate::grid::Grid;
    use crate::region::{Region, RegionGrid, TreeSpecies};
    use tempfile::tempdir;

    fn plains_world(detail: f32) -> World {
        World::new(
            RegionGrid::uniform(Region::default()),
            vec![TreeSpecies { grows_high: true }],
            EntropyMap::from_grid(Grid::new_with(37, 29, detail)),
            1,
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(120)
    }

    #[test]
    fn test_stage_order() {
        let order = [
            Stage::Begin,
            Stage::Position,
            Stage::Normal,
            Stage::Surface1,
            Stage::Surface2,
            Stage::Color,
            Stage::Trees,
            Stage::Save,
            Stage::Done,
        ];
        for pair in order.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn test_build_plains_scenario() {
        let world = plains_world(0.25);
        let store = PageStore::disabled();
        let mut page = CachePage::new(0, 0);

        page.build(&world, &store, far_deadline());
        assert!(page.is_ready());

        let region = Region::default();
        let cell = *page.cell(64, 64);
        assert_eq!(cell.surface, Surface::Grass);
        let expected = region.geo_water + 0.25 * region.geo_detail + region.geo_bias;
        assert!((cell.elevation - expected).abs() < 1e-4);
        // Flat world: normals point straight up.
        assert!((cell.normal - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn test_build_resumable_matches_one_shot() {
        let world = plains_world(0.4);
        let store = PageStore::disabled();

        let mut one_shot = CachePage::new(2, 3);
        one_shot.build(&world, &store, far_deadline());

        fn ordinal(stage: Stage) -> usize {
            let mut n = 0;
            let mut s = Stage::Begin;
            while s != stage {
                s = s.next();
                n += 1;
            }
            n
        }

        let mut incremental = CachePage::new(2, 3);
        let mut calls = 0;
        let mut last = ordinal(incremental.stage());
        while !incremental.is_ready() {
            // An already-expired deadline still makes minimal progress.
            incremental.build(&world, &store, Instant::now());
            // The stage only ever advances.
            let now = ordinal(incremental.stage());
            assert!(now >= last, "stage went backwards");
            last = now;
            calls += 1;
            assert!(calls < PAGE_SIZE * PAGE_SIZE * 10, "build failed to converge");
        }

        assert_eq!(one_shot.cells(), incremental.cells());
    }

    #[test]
    fn test_page_round_trip() {
        let dir = tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let world = plains_world(0.3);

        let mut page = CachePage::new(1, 2);
        page.build(&world, &store, far_deadline());
        assert!(store.page_path(1, 2).exists());

        let cells = store.load(1, 2).unwrap().unwrap();
        let mut restored = CachePage::from_cells(1, 2, cells);
        assert!(restored.is_ready());
        assert_eq!(page.cells(), restored.cells());
        assert_eq!(
            page.cell(5, 7).elevation,
            restored.cell(5, 7).elevation
        );
    }

    #[test]
    fn test_save_cooldown_suppresses_rewrite() {
        let dir = tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let world = plains_world(0.3);

        let mut page = CachePage::new(0, 1);
        page.build(&world, &store, far_deadline());
        assert!(store.page_path(0, 1).exists());

        // Saving again right away is inside the cooldown window.
        fs::remove_file(store.page_path(0, 1)).unwrap();
        page.save(&store);
        assert!(!store.page_path(0, 1).exists());
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let store = PageStore::new(dir.path());

        assert!(store.load(4, 4).unwrap().is_none());

        fs::write(store.page_path(4, 4), b"garbage").unwrap();
        assert!(store.load(4, 4).is_err());
    }

    #[test]
    fn test_load_rejects_wrong_coordinate() {
        let dir = tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let world = plains_world(0.2);

        let mut page = CachePage::new(3, 3);
        page.build(&world, &store, far_deadline());

        fs::rename(store.page_path(3, 3), store.page_path(5, 5)).unwrap();
        assert!(store.load(5, 5).is_err());
    }

    #[test]
    fn test_clear_removes_only_page_files() {
        let dir = tempdir().unwrap();
        let store = PageStore::new(dir.path());
        let world = plains_world(0.2);

        let mut page = CachePage::new(0, 0);
        page.build(&world, &store, far_deadline());
        fs::write(dir.path().join("entropy.raw"), b"keep me").unwrap();

        assert_eq!(store.clear().unwrap(), 1);
        assert!(!store.page_path(0, 0).exists());
        assert!(dir.path().join("entropy.raw").exists());
    }

    #[test]
    fn test_trees_planted_on_plains() {
        // Uniform plains with species 1 everywhere and enough detail to
        // clear the planting threshold.
        let mut region = Region::default();
        region.tree_species = 1;
        let world = World::new(
            RegionGrid::uniform(region),
            vec![TreeSpecies { grows_high: false }],
            EntropyMap::from_grid(Grid::new_with(37, 29, 0.5)),
            1,
        );
        let store = PageStore::disabled();
        let mut page = CachePage::new(0, 0);
        page.build(&world, &store, far_deadline());

        let planted = page.cells().iter().filter(|c| c.tree_id != 0).count();
        // One coarse cell, one tree, nothing more.
        assert!(planted > 0);
        assert!(planted <= (PAGE_SIZE / TREE_SPACING) * (PAGE_SIZE / TREE_SPACING));
    }

    #[test]
    fn test_queries_legal_mid_build() {
        let world = plains_world(0.3);
        let store = PageStore::disabled();
        let mut page = CachePage::new(0, 0);

        // Nothing resolved yet: defaults come back, no panic.
        assert_eq!(page.cell(10, 10).surface, Surface::Null);

        page.build(&world, &store, Instant::now());
        assert!(!page.is_ready());
        let _ = page.cell(10, 10).elevation;
    }
}
