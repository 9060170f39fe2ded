//! The page cache: a fixed grid of lazily created, disk-backed pages.
//!
//! At most one page object exists per page coordinate; an empty slot means
//! "not currently cached", never "does not exist in the world". Point
//! queries that land outside the world, or on a slot with no page, return
//! documented sentinels instead of failing. Idle pages are found by a
//! round-robin sweep that walks a few slots per call, saves anything
//! expired, and frees the slot for lazy re-creation.

use std::io;
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::page::{CachePage, Cell, PageStore, Surface, PAGE_SIZE};
use crate::world::{World, WORLD_SIZE};

/// Pages per world axis.
pub const PAGE_GRID: usize = WORLD_SIZE / PAGE_SIZE;

/// A page untouched for this long is saved and dropped.
const PAGE_EXPIRE: Duration = Duration::from_secs(30);
/// Slots examined per eviction sweep call.
const SWEEP_VISITS: usize = PAGE_GRID / 4;

/// Elevation returned for queries the cache cannot answer.
pub const ELEVATION_SENTINEL: f32 = -99.0;
/// Magenta, so a sampled-but-missing page is visible immediately.
pub const COLOR_SENTINEL: Vec3 = Vec3::new(1.0, 0.0, 1.0);

/// Cache statistics for monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    /// Queries answered by a live page
    pub hits: usize,
    /// Queries that found no page in the slot
    pub misses: usize,
    /// Pages dropped by the eviction sweep
    pub evictions: usize,
    /// Pages restored from disk instead of rebuilding
    pub disk_loads: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    /// Format as a human-readable string.
    pub fn summary(&self, live: usize) -> String {
        format!(
            "Hits: {} | Misses: {} | Rate: {:.1}% | Evictions: {} | Disk loads: {} | Live: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.disk_loads,
            live
        )
    }
}

/// Owner of every live page in the world.
pub struct PageCache {
    pages: Vec<Option<Box<CachePage>>>,
    store: PageStore,
    live: usize,
    /// Eviction sweep cursor over the page grid.
    walk: (usize, usize),
    expire: Duration,
    stats: CacheStats,
}

impl PageCache {
    pub fn new(store: PageStore) -> Self {
        Self::with_expiry(store, PAGE_EXPIRE)
    }

    /// Custom idle window; tests use short ones to exercise eviction.
    pub fn with_expiry(store: PageStore, expire: Duration) -> Self {
        let mut pages = Vec::with_capacity(PAGE_GRID * PAGE_GRID);
        pages.resize_with(PAGE_GRID * PAGE_GRID, || None);
        Self {
            pages,
            store,
            live: 0,
            walk: (0, 0),
            expire,
            stats: CacheStats::default(),
        }
    }

    pub fn store_mut(&mut self) -> &mut PageStore {
        &mut self.store
    }

    pub fn live_pages(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Page-grid coordinate owning a world position, or None outside the
    /// world (including all negative coordinates).
    fn page_index(world_x: i32, world_y: i32) -> Option<(usize, usize)> {
        if world_x < 0
            || world_y < 0
            || world_x >= WORLD_SIZE as i32
            || world_y >= WORLD_SIZE as i32
        {
            return None;
        }
        Some((
            world_x as usize / PAGE_SIZE,
            world_y as usize / PAGE_SIZE,
        ))
    }

    fn slot(page_x: usize, page_y: usize) -> usize {
        page_y * PAGE_GRID + page_x
    }

    /// Get the page for a slot, creating it if needed. Creation prefers the
    /// on-disk copy; an unreadable file is demoted to "missing" and the
    /// page rebuilds from scratch.
    fn ensure_page(&mut self, page_x: usize, page_y: usize) -> &mut CachePage {
        let slot = Self::slot(page_x, page_y);
        if self.pages[slot].is_none() {
            let page = match self.store.load(page_x, page_y) {
                Ok(Some(cells)) => {
                    self.stats.disk_loads += 1;
                    CachePage::from_cells(page_x, page_y, cells)
                }
                Ok(None) => CachePage::new(page_x, page_y),
                Err(e) => {
                    eprintln!(
                        "Warning: discarding unreadable page ({}, {}): {}",
                        page_x, page_y, e
                    );
                    CachePage::new(page_x, page_y)
                }
            };
            self.pages[slot] = Some(Box::new(page));
            self.live += 1;
        }
        self.pages[slot].as_deref_mut().unwrap()
    }

    /// Is the page under this world position fully built? Creates (and
    /// possibly disk-loads) the page as a side effect, so a caller polling
    /// this drives the cache toward having the page ready.
    pub fn point_available(&mut self, world_x: i32, world_y: i32) -> bool {
        match Self::page_index(world_x, world_y) {
            Some((px, py)) => self.ensure_page(px, py).is_ready(),
            None => false,
        }
    }

    /// Advance the build of the page under this world position. No-op when
    /// the page does not exist or the position is outside the world.
    pub fn update_page(&mut self, world: &World, world_x: i32, world_y: i32, deadline: Instant) {
        let Some((px, py)) = Self::page_index(world_x, world_y) else {
            return;
        };
        if let Some(page) = self.pages[Self::slot(px, py)].as_deref_mut() {
            page.build(world, &self.store, deadline);
        }
    }

    /// The cell under a world position, if its page is live. Counts toward
    /// hit/miss statistics and refreshes the page's idle clock.
    fn cell(&mut self, world_x: i32, world_y: i32) -> Option<&Cell> {
        let (px, py) = Self::page_index(world_x, world_y)?;
        match self.pages[Self::slot(px, py)].as_deref_mut() {
            Some(page) => {
                self.stats.hits += 1;
                Some(page.cell(
                    world_x as usize % PAGE_SIZE,
                    world_y as usize % PAGE_SIZE,
                ))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn elevation(&mut self, world_x: i32, world_y: i32) -> f32 {
        self.cell(world_x, world_y)
            .map(|c| c.elevation)
            .unwrap_or(ELEVATION_SENTINEL)
    }

    pub fn detail(&mut self, world_x: i32, world_y: i32) -> f32 {
        self.cell(world_x, world_y).map(|c| c.detail).unwrap_or(0.0)
    }

    pub fn surface(&mut self, world_x: i32, world_y: i32) -> Surface {
        self.cell(world_x, world_y)
            .map(|c| c.surface)
            .unwrap_or(Surface::Null)
    }

    pub fn color(&mut self, world_x: i32, world_y: i32) -> Vec3 {
        self.cell(world_x, world_y)
            .map(|c| c.color)
            .unwrap_or(COLOR_SENTINEL)
    }

    pub fn normal(&mut self, world_x: i32, world_y: i32) -> Vec3 {
        self.cell(world_x, world_y)
            .map(|c| c.normal)
            .unwrap_or(Vec3::Z)
    }

    pub fn tree(&mut self, world_x: i32, world_y: i32) -> u32 {
        self.cell(world_x, world_y).map(|c| c.tree_id).unwrap_or(0)
    }

    /// World position with resolved elevation; the z falls back to the
    /// elevation sentinel like `elevation` does.
    pub fn position(&mut self, world_x: i32, world_y: i32) -> Vec3 {
        Vec3::new(
            world_x as f32,
            world_y as f32,
            self.elevation(world_x, world_y),
        )
    }

    /// Elevation at a fractional position, interpolated over the four
    /// surrounding cells with the shared diagonal-split quad scheme.
    pub fn elevation_interpolated(&mut self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let dx = x - x0;
        let dy = y - y0;
        let xi = x0 as i32;
        let yi = y0 as i32;

        let p00 = self.elevation(xi, yi);
        let p10 = self.elevation(xi + 1, yi);
        let p01 = self.elevation(xi, yi + 1);
        let p11 = self.elevation(xi + 1, yi + 1);

        // Same checkerboard split the region blender uses, here per cell
        // quad, matching how the terrain would triangulate.
        let left = (xi + yi).rem_euclid(2) == 0;
        crate::grid::interpolate_quad(p00, p10, p01, p11, dx, dy, left)
    }

    /// Eviction sweep. Advances the walk cursor across at most
    /// `SWEEP_VISITS` slots (fewer if the deadline hits), saving and
    /// freeing any page idle past the expiry window. Half-built pages are
    /// dropped without saving; the disk format only ever holds finished
    /// pages.
    pub fn update(&mut self, deadline: Instant) {
        for _ in 0..SWEEP_VISITS {
            if Instant::now() >= deadline {
                break;
            }
            let slot = Self::slot(self.walk.0, self.walk.1);
            self.walk.0 += 1;
            if self.walk.0 >= PAGE_GRID {
                self.walk.0 = 0;
                self.walk.1 = (self.walk.1 + 1) % PAGE_GRID;
            }

            let expired = match self.pages[slot].as_deref_mut() {
                Some(page) if page.idle() > self.expire => {
                    if page.is_ready() {
                        page.save(&self.store);
                    }
                    true
                }
                _ => false,
            };
            if expired {
                self.pages[slot] = None;
                self.live -= 1;
                self.stats.evictions += 1;
            }
        }
    }

    /// Synchronously save and free every live page (world save / shutdown).
    pub fn purge(&mut self) {
        for slot in self.pages.iter_mut() {
            if let Some(page) = slot.as_deref_mut() {
                if page.is_ready() {
                    page.save(&self.store);
                }
                *slot = None;
            }
        }
        self.live = 0;
    }

    /// Purge, then delete every page file on disk (save deletion). Returns
    /// how many files were removed.
    pub fn dump(&mut self) -> io::Result<usize> {
        self.purge();
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::EntropyMap;
    use crate::grid::Grid;
    use crate::page::PageStore;
    use crate::region::{Region, RegionGrid};
    use tempfile::tempdir;

    fn plains_world() -> World {
        World::new(
            RegionGrid::uniform(Region::default()),
            Vec::new(),
            EntropyMap::from_grid(Grid::new_with(37, 29, 0.25)),
            1,
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(120)
    }

    fn build_page_at(cache: &mut PageCache, world: &World, x: i32, y: i32) {
        assert!(!cache.point_available(x, y));
        while !cache.point_available(x, y) {
            cache.update_page(world, x, y, far_deadline());
        }
    }

    #[test]
    fn test_out_of_range_sentinels() {
        let mut cache = PageCache::new(PageStore::disabled());
        for (x, y) in [(-1, 5), (5, -1), (WORLD_SIZE as i32, 0), (0, WORLD_SIZE as i32)] {
            assert!(!cache.point_available(x, y));
            assert_eq!(cache.elevation(x, y), ELEVATION_SENTINEL);
            assert_eq!(cache.surface(x, y), Surface::Null);
            assert_eq!(cache.color(x, y), COLOR_SENTINEL);
            assert_eq!(cache.normal(x, y), Vec3::Z);
            assert_eq!(cache.tree(x, y), 0);
            assert_eq!(cache.detail(x, y), 0.0);
        }
        assert_eq!(cache.live_pages(), 0);
    }

    #[test]
    fn test_missing_page_sentinels_and_lazy_creation() {
        let mut cache = PageCache::new(PageStore::disabled());

        // Getters never create pages.
        assert_eq!(cache.elevation(10, 10), ELEVATION_SENTINEL);
        assert_eq!(cache.live_pages(), 0);
        assert!(cache.stats().misses > 0);

        // Availability polling does.
        assert!(!cache.point_available(10, 10));
        assert_eq!(cache.live_pages(), 1);
    }

    #[test]
    fn test_build_and_query() {
        let world = plains_world();
        let mut cache = PageCache::new(PageStore::disabled());
        build_page_at(&mut cache, &world, 200, 200);

        let region = Region::default();
        let expected = region.geo_water + 0.25 * region.geo_detail + region.geo_bias;
        assert!((cache.elevation(200, 200) - expected).abs() < 1e-4);
        assert_eq!(cache.surface(200, 200), Surface::Grass);

        // Fractional sampling inside a flat page equals the flat value.
        assert!((cache.elevation_interpolated(200.4, 200.7) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_eviction_and_reload() {
        let dir = tempdir().unwrap();
        let world = plains_world();
        let mut cache = PageCache::with_expiry(PageStore::new(dir.path()), Duration::ZERO);

        build_page_at(&mut cache, &world, 5, 5);
        assert_eq!(cache.live_pages(), 1);
        assert!(dir.path().join("cache0-0.pag").exists());

        // Idle longer than the (zero) expiry window: the sweep drops it.
        cache.update(far_deadline());
        assert_eq!(cache.live_pages(), 0);
        assert_eq!(cache.stats().evictions, 1);
        assert!(dir.path().join("cache0-0.pag").exists());

        // Next access restores it from disk, ready immediately.
        assert!(cache.point_available(5, 5));
        assert_eq!(cache.stats().disk_loads, 1);
        assert_eq!(cache.surface(5, 5), Surface::Grass);
    }

    #[test]
    fn test_unbuilt_pages_evict_without_saving() {
        let dir = tempdir().unwrap();
        let mut cache = PageCache::with_expiry(PageStore::new(dir.path()), Duration::ZERO);

        assert!(!cache.point_available(5, 5));
        cache.update(far_deadline());
        assert_eq!(cache.live_pages(), 0);
        assert!(!dir.path().join("cache0-0.pag").exists());
    }

    #[test]
    fn test_purge_saves_everything() {
        let dir = tempdir().unwrap();
        let world = plains_world();
        let mut cache = PageCache::new(PageStore::new(dir.path()));

        build_page_at(&mut cache, &world, 5, 5);
        build_page_at(&mut cache, &world, 5 + PAGE_SIZE as i32, 5);
        assert_eq!(cache.live_pages(), 2);

        cache.purge();
        assert_eq!(cache.live_pages(), 0);
        assert!(dir.path().join("cache0-0.pag").exists());
        assert!(dir.path().join("cache1-0.pag").exists());
    }

    #[test]
    fn test_dump_deletes_files() {
        let dir = tempdir().unwrap();
        let world = plains_world();
        let mut cache = PageCache::new(PageStore::new(dir.path()));

        build_page_at(&mut cache, &world, 5, 5);
        assert!(dir.path().join("cache0-0.pag").exists());

        let removed = cache.dump().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.live_pages(), 0);
        assert!(!dir.path().join("cache0-0.pag").exists());
    }

    #[test]
    fn test_corrupt_file_rebuilds() {
        let dir = tempdir().unwrap();
        let world = plains_world();
        std::fs::write(dir.path().join("cache0-0.pag"), b"junk").unwrap();

        let mut cache = PageCache::new(PageStore::new(dir.path()));
        assert!(!cache.point_available(5, 5));
        build_page_at(&mut cache, &world, 5, 5);
        assert_eq!(cache.surface(5, 5), Surface::Grass);
        assert_eq!(cache.stats().disk_loads, 0);
    }

    #[test]
    fn test_update_page_without_page_is_noop() {
        let world = plains_world();
        let mut cache = PageCache::new(PageStore::disabled());
        cache.update_page(&world, 50, 50, far_deadline());
        assert_eq!(cache.live_pages(), 0);
    }
}
