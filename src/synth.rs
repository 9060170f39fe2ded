//! Height and color synthesis.
//!
//! Pure functions that turn region rules plus an entropy detail sample into
//! terrain values. Nothing here holds state: the world object samples the
//! entropy map and the dither table, then delegates to these.
//!
//! Elevation near a region boundary is a blend of up to four neighboring
//! regions' height functions, each evaluated at the query point in its own
//! frame. Quads are interpolated with a diagonal split whose orientation
//! alternates in a checkerboard over the region grid; without the
//! alternation the shared diagonal direction shows up as diamond artifacts
//! along boundaries.

use glam::Vec2;

use crate::grid::interpolate_quad;
use crate::region::{Climate, Region, RegionGrid, ShapeFlags, SurfaceColor};
use crate::world::{BLEND_DISTANCE, REGION_SIZE};

use std::f32::consts::TAU;

/// Fraction of the river width used as meander amplitude. Kept well under
/// half the carve band so the warped channel never escapes its own carve.
const MEANDER_SCALE: f32 = 0.125;

/// Elevation of a single region at `offset` (the query position in that
/// region's frame; during boundary blending it may poke slightly outside
/// [0,1)). Applies the region's shape-flag modifiers in a fixed order:
/// detail reshaping first, then the elevation-space modifiers.
pub fn do_height(region: &Region, offset: Vec2, water_level: f32, detail: f32, bias: f32) -> f32 {
    let mut detail = detail;

    if region.shape.contains(ShapeFlags::CRATER) {
        detail = detail.max(0.5);
    }
    if region.shape.contains(ShapeFlags::TIERED) {
        if detail < 0.2 {
            detail += 0.2;
        } else if detail < 0.5 {
            detail -= 0.2;
        }
    }
    if region.shape.contains(ShapeFlags::CRACK) && detail > 0.2 && detail < 0.3 {
        detail = 0.0;
    }
    if region.shape.contains(ShapeFlags::SINKHOLE) {
        let x = (offset.x - 0.5).abs();
        let y = (offset.y - 0.5).abs();
        if detail > x.max(y) {
            detail *= 0.25;
        }
    }
    // Rivers flatten the detail toward the region center so the channel
    // carve isn't fighting local bumps.
    if region.has_river() {
        let cen_x = ((offset.x - 0.5) * 2.0).abs();
        let cen_y = ((offset.y - 0.5) * 2.0).abs();
        detail *= cen_x.max(cen_y).max(0.1);
    }

    let mut elevation = water_level + detail * region.geo_detail + bias;

    if region.shape.contains(ShapeFlags::MESAS) {
        let x = (offset.x - 0.5).abs() / 5.0;
        let y = (offset.y - 0.5).abs() / 5.0;
        if detail + 0.01 < x + y {
            elevation += region.geo_detail;
        }
    }
    if region.shape.contains(ShapeFlags::CANYON_NS) {
        let x = ((offset.x - 0.5) * 2.0).abs();
        if x + detail < 0.5 {
            elevation -= region.geo_detail.min(10.0) * (0.5 - x) * 2.0;
        }
    }
    if region.shape.contains(ShapeFlags::BEACH) && elevation > 0.0 && elevation < region.cliff_threshold
    {
        // Quadratic easing that compresses the shore flat against the
        // cliff threshold.
        let t = 1.0 - elevation / region.cliff_threshold;
        elevation = (1.0 - t * t) * region.cliff_threshold;
    }
    if region.shape.contains(ShapeFlags::BEACH_CLIFF) && elevation < region.cliff_threshold {
        elevation -= region.cliff_threshold.min(10.0);
    }

    if region.climate == Climate::Swamp {
        elevation -= region.geo_detail / 2.0;
        elevation = elevation.max(region.geo_water - 0.5);
    }

    elevation
}

/// Carve the river channel into an already-blended elevation. Only the
/// region containing the query point is consulted; no-op without a river
/// flag.
pub fn do_height_no_blend(region: &Region, offset: Vec2, elevation: f32, water_level: f32) -> f32 {
    if !region.has_river() {
        return elevation;
    }

    let strength = river_strength(region, offset);
    let half_width = region.river_width / 2.0;
    if strength >= half_width {
        return elevation;
    }

    let pull = 1.0 - strength / half_width;
    let target = water_level - 4.0 * region.river_width;
    elevation - (elevation - target) * pull
}

/// Distance from the river centerline, in center-to-edge units (0 on the
/// channel, 1 at the region edge).
///
/// The channel is the union of segments from the region center to the edge
/// midpoints named by the direction flags. Pure N/S and pure E/W rivers
/// meander: the perpendicular offset is warped sinusoidally with a phase
/// derived from the flow-parallel grid coordinate, so consecutive segments
/// of the same river line up across region boundaries.
fn river_strength(region: &Region, offset: Vec2) -> f32 {
    let n = region.shape.contains(ShapeFlags::RIVER_N);
    let s = region.shape.contains(ShapeFlags::RIVER_S);
    let e = region.shape.contains(ShapeFlags::RIVER_E);
    let w = region.shape.contains(ShapeFlags::RIVER_W);

    let mut off = offset;
    let amplitude = region.river_width * MEANDER_SCALE;
    if (n || s) && !(e || w) {
        let phase = region.grid_pos.0 as f32 * 2.4;
        off.x += (off.y * TAU + phase).sin() * amplitude;
    } else if (e || w) && !(n || s) {
        let phase = region.grid_pos.1 as f32 * 2.4;
        off.y += (off.x * TAU + phase).sin() * amplitude;
    }

    let cen_x = ((off.x - 0.5) * 2.0).abs();
    let cen_y = ((off.y - 0.5) * 2.0).abs();
    // Distance to the region center, same scale as cen_x/cen_y.
    let radial = Vec2::new(off.x - 0.5, off.y - 0.5).length() * 2.0;

    let mut strength = f32::MAX;
    if n {
        strength = strength.min(if off.y <= 0.5 { cen_x } else { radial });
    }
    if s {
        strength = strength.min(if off.y >= 0.5 { cen_x } else { radial });
    }
    if e {
        strength = strength.min(if off.x >= 0.5 { cen_y } else { radial });
    }
    if w {
        strength = strength.min(if off.x <= 0.5 { cen_y } else { radial });
    }
    strength
}

/// One axis of the boundary-blend setup: the two region columns (or rows)
/// to sample and the interpolant between them. Within `BLEND_DISTANCE` of a
/// boundary the interpolant ramps from 0.5 (on the boundary) to 1.0 (fully
/// inside); elsewhere the axis degenerates to the single containing region.
struct AxisBlend {
    lo: i32,
    hi: i32,
    t: f32,
}

fn axis_blend(world: f32) -> AxisBlend {
    let size = REGION_SIZE as f32;
    let region = (world / size).floor();
    let offset = world - region * size;
    let region = region as i32;

    if offset < BLEND_DISTANCE {
        AxisBlend {
            lo: region - 1,
            hi: region,
            t: 0.5 + offset / (2.0 * BLEND_DISTANCE),
        }
    } else if offset > size - BLEND_DISTANCE {
        AxisBlend {
            lo: region,
            hi: region + 1,
            t: (offset - (size - BLEND_DISTANCE)) / (2.0 * BLEND_DISTANCE),
        }
    } else {
        AxisBlend {
            lo: region,
            hi: region,
            t: 0.0,
        }
    }
}

/// Evaluate `f` for each corner region of the blend quad at `world` and
/// interpolate. The cheap path (no boundary in range) evaluates only the
/// containing region.
fn blend_regions(
    regions: &RegionGrid,
    world: Vec2,
    mut f: impl FnMut(&Region, Vec2) -> f32,
) -> f32 {
    let bx = axis_blend(world.x);
    let by = axis_blend(world.y);

    let offset_in = |rx: i32, ry: i32| {
        Vec2::new(
            world.x / REGION_SIZE as f32 - rx as f32,
            world.y / REGION_SIZE as f32 - ry as f32,
        )
    };

    if bx.lo == bx.hi && by.lo == by.hi {
        let region = regions.get(bx.lo, by.lo);
        return f(region, offset_in(bx.lo, by.lo));
    }

    let p00 = f(regions.get(bx.lo, by.lo), offset_in(bx.lo, by.lo));
    let p10 = f(regions.get(bx.hi, by.lo), offset_in(bx.hi, by.lo));
    let p01 = f(regions.get(bx.lo, by.hi), offset_in(bx.lo, by.hi));
    let p11 = f(regions.get(bx.hi, by.hi), offset_in(bx.hi, by.hi));

    // The checkerboard parity is taken from the quad's low corner so both
    // sides of a boundary agree on the split orientation.
    let left = (bx.lo + by.lo).rem_euclid(2) == 0;
    interpolate_quad(p00, p10, p01, p11, bx.t, by.t, left)
}

/// Blended elevation at a world position, river carve included.
pub fn elevation_at(regions: &RegionGrid, world: Vec2, detail: f32) -> f32 {
    let blended = blend_regions(regions, world, |region, offset| {
        do_height(region, offset, region.geo_water, detail, region.geo_bias)
    });

    let size = REGION_SIZE as f32;
    let rx = (world.x / size).floor();
    let ry = (world.y / size).floor();
    let containing = regions.get(rx as i32, ry as i32);
    let offset = Vec2::new(world.x / size - rx, world.y / size - ry);
    do_height_no_blend(containing, offset, blended, containing.geo_water)
}

/// Blended water table at a world position.
pub fn water_level_at(regions: &RegionGrid, world: Vec2) -> f32 {
    blend_regions(regions, world, |region, _| region.geo_water)
}

/// Region base color at a (pre-dithered) world position. Colors always
/// interpolate across the four surrounding regions using the in-region
/// offset as the interpolant, so palettes wash into each other instead of
/// snapping at boundaries.
pub fn region_color(regions: &RegionGrid, world: Vec2, channel: SurfaceColor) -> glam::Vec3 {
    let size = REGION_SIZE as f32;
    let rx = (world.x / size).floor() as i32;
    let ry = (world.y / size).floor() as i32;
    let dx = world.x / size - (world.x / size).floor();
    let dy = world.y / size - (world.y / size).floor();

    let c00 = regions.get(rx, ry).color(channel);
    let c10 = regions.get(rx + 1, ry).color(channel);
    let c01 = regions.get(rx, ry + 1).color(channel);
    let c11 = regions.get(rx + 1, ry + 1).color(channel);

    let left = (rx + ry).rem_euclid(2) == 0;
    glam::Vec3::new(
        interpolate_quad(c00.x, c10.x, c01.x, c11.x, dx, dy, left),
        interpolate_quad(c00.y, c10.y, c01.y, c11.y, dx, dy, left),
        interpolate_quad(c00.z, c10.z, c01.z, c11.z, dx, dy, left),
    )
}
