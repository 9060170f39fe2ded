use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use terrain_pager::cache::PageCache;
use terrain_pager::entropy::{generate_seed_image, ENTROPY_SEED_FILE};
use terrain_pager::page::{PageStore, PAGE_SIZE};
use terrain_pager::world::{derive_seed, World, WORLD_SIZE};

#[derive(Parser, Debug)]
#[command(name = "terrain_pager")]
#[command(about = "Stream procedurally generated terrain pages around a point")]
struct Args {
    /// World seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Directory for the entropy cache and page files
    #[arg(short, long, default_value = "terrain_data")]
    data_dir: PathBuf,

    /// World X coordinate to stream around (default: world center)
    #[arg(short = 'x', long, default_value = "4096")]
    center_x: i32,

    /// World Y coordinate to stream around
    #[arg(short = 'y', long, default_value = "4096")]
    center_y: i32,

    /// Radius in pages to stream around the center
    #[arg(short, long, default_value = "1")]
    radius: i32,

    /// Per-frame build budget in milliseconds
    #[arg(short, long, default_value = "4")]
    budget_ms: u64,

    /// Disable the disk page cache (pages live purely in memory)
    #[arg(long)]
    no_cache: bool,

    /// Delete all cached pages before starting
    #[arg(long)]
    fresh: bool,

    /// Export PNG maps of the streamed area with this filename prefix
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = fs::create_dir_all(&args.data_dir) {
        eprintln!("Warning: could not create {}: {}", args.data_dir.display(), e);
    }

    // A fresh install ships without a seed bitmap; synthesize one so the
    // entropy pipeline has something to erode. Odd dimensions keep the
    // finished map from tiling in sync with the page grid.
    let seed_path = args.data_dir.join(ENTROPY_SEED_FILE);
    if !seed_path.exists() {
        println!("Generating entropy seed bitmap...");
        if let Err(e) = generate_seed_image(&seed_path, 997, 743, derive_seed(args.seed, "entropy"))
        {
            eprintln!("Warning: could not write seed bitmap: {}", e);
        }
    }

    println!("Building world rules for seed {}...", args.seed);
    let world = World::demo(args.seed, &args.data_dir);

    let mut store = PageStore::new(&args.data_dir);
    store.set_enabled(!args.no_cache);
    let mut cache = PageCache::new(store);

    if args.fresh {
        match cache.dump() {
            Ok(n) => println!("Dumped {} cached page files", n),
            Err(e) => eprintln!("Warning: dump failed: {}", e),
        }
    }

    // One probe point per page in the streamed square.
    let mut targets = Vec::new();
    for dy in -args.radius..=args.radius {
        for dx in -args.radius..=args.radius {
            let tx = args.center_x + dx * PAGE_SIZE as i32;
            let ty = args.center_y + dy * PAGE_SIZE as i32;
            if tx >= 0 && ty >= 0 && tx < WORLD_SIZE as i32 && ty < WORLD_SIZE as i32 {
                targets.push((tx, ty));
            }
        }
    }

    println!(
        "Streaming {} pages at {} ms/frame...",
        targets.len(),
        args.budget_ms
    );
    let start = Instant::now();
    let mut frames = 0u64;
    loop {
        let deadline = Instant::now() + Duration::from_millis(args.budget_ms);
        let mut pending = false;
        for &(tx, ty) in &targets {
            if !cache.point_available(tx, ty) {
                pending = true;
                cache.update_page(&world, tx, ty, deadline);
            }
        }
        cache.update(deadline);
        frames += 1;

        if !pending {
            break;
        }
    }
    println!(
        "All pages ready after {} frames ({:.2?} total)",
        frames,
        start.elapsed()
    );
    println!("{}", cache.stats().summary(cache.live_pages()));

    let center = cache.position(args.center_x, args.center_y);
    println!(
        "Center cell: elevation {:.2}, surface {:?}, tree {}",
        center.z,
        cache.surface(args.center_x, args.center_y),
        cache.tree(args.center_x, args.center_y),
    );
    println!(
        "Half-step elevation: {:.2}",
        cache.elevation_interpolated(args.center_x as f32 + 0.5, args.center_y as f32 + 0.5)
    );

    if let Some(prefix) = &args.export {
        export_maps(&mut cache, &args, prefix);
    }

    cache.purge();
    println!("Purged; goodbye.");
}

/// Dump the streamed area as PNGs: lit surface colors and an
/// elevation ramp.
fn export_maps(cache: &mut PageCache, args: &Args, prefix: &str) {
    use image::{Rgb, RgbImage};

    // Window aligned to the page grid so it covers exactly the built pages.
    let extent = (args.radius * 2 + 1) * PAGE_SIZE as i32;
    let origin_x = (args.center_x / PAGE_SIZE as i32 - args.radius) * PAGE_SIZE as i32;
    let origin_y = (args.center_y / PAGE_SIZE as i32 - args.radius) * PAGE_SIZE as i32;

    let mut color_img = RgbImage::new(extent as u32, extent as u32);
    let mut elev_img = RgbImage::new(extent as u32, extent as u32);

    // Light from the northwest, like every map shader ever.
    let light = glam::Vec3::new(-0.5, -0.5, 0.7).normalize();

    let mut min_e = f32::MAX;
    let mut max_e = f32::MIN;
    for py in 0..extent {
        for px in 0..extent {
            let e = cache.elevation(origin_x + px, origin_y + py);
            min_e = min_e.min(e);
            max_e = max_e.max(e);
        }
    }
    let range = (max_e - min_e).max(1e-3);

    for py in 0..extent {
        for px in 0..extent {
            let wx = origin_x + px;
            let wy = origin_y + py;
            let shade = cache.normal(wx, wy).dot(light).max(0.0) * 0.6 + 0.4;
            let color = cache.color(wx, wy) * shade;
            color_img.put_pixel(
                px as u32,
                py as u32,
                Rgb([
                    (color.x.clamp(0.0, 1.0) * 255.0) as u8,
                    (color.y.clamp(0.0, 1.0) * 255.0) as u8,
                    (color.z.clamp(0.0, 1.0) * 255.0) as u8,
                ]),
            );

            let e = cache.elevation(wx, wy);
            let t = (e - min_e) / range;
            let pixel = if e < 0.0 {
                // Below sea level: blue ramp by depth.
                Rgb([40, 80, (120.0 + 135.0 * t) as u8])
            } else {
                let g = (40.0 + 215.0 * t) as u8;
                Rgb([g, g, g])
            };
            elev_img.put_pixel(px as u32, py as u32, pixel);
        }
    }

    let color_path = format!("{}_color.png", prefix);
    let elev_path = format!("{}_elevation.png", prefix);
    match color_img.save(&color_path) {
        Ok(()) => println!("Saved {}", color_path),
        Err(e) => eprintln!("Warning: could not save {}: {}", color_path, e),
    }
    match elev_img.save(&elev_path) {
        Ok(()) => println!("Saved {}", elev_path),
        Err(e) => eprintln!("Warning: could not save {}: {}", elev_path, e),
    }
}
