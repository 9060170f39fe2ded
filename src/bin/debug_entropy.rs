//! Debug tool for inspecting the entropy erosion pipeline visually.
//! Dumps the seed bitmap and the finished map side by side as PNGs.

use std::path::Path;
use std::time::Instant;

use terrain_pager::entropy::{self, ENTROPY_SEED_FILE};
use terrain_pager::grid::Grid;

const DATA_DIR: &str = "terrain_data";
const SEED: u64 = 42;

fn main() {
    let data_dir = Path::new(DATA_DIR);
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        eprintln!("Warning: could not create {}: {}", data_dir.display(), e);
    }

    let seed_path = data_dir.join(ENTROPY_SEED_FILE);
    if !seed_path.exists() {
        println!("No seed bitmap, synthesizing one...");
        entropy::generate_seed_image(&seed_path, 997, 743, SEED).expect("seed bitmap");
    }

    let seed_grid = entropy::load_seed_bitmap(&seed_path).expect("readable seed bitmap");
    println!("Seed bitmap: {}x{}", seed_grid.width, seed_grid.height);
    export_grayscale(&seed_grid, "entropy_before.png");

    let start = Instant::now();
    let finished = entropy::generate(seed_grid);
    println!("Erosion pipeline took {:.2?}", start.elapsed());

    let (min, max) = finished.min_max();
    println!("Finished map range: [{:.4}, {:.4}]", min, max);
    export_grayscale(&finished, "entropy_after.png");
}

fn export_grayscale(grid: &Grid<f32>, filename: &str) {
    let img = image::GrayImage::from_fn(grid.width as u32, grid.height as u32, |x, y| {
        let v = (*grid.get(x as usize, y as usize)).clamp(0.0, 1.0);
        image::Luma([(v * 255.0) as u8])
    });
    match img.save(filename) {
        Ok(()) => println!("Saved {}", filename),
        Err(e) => eprintln!("Warning: could not save {}: {}", filename, e),
    }
}
