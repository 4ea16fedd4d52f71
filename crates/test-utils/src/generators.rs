//! Test data generators for synthetic precipitation grids.
//!
//! These generators create predictable, verifiable patterns that can be
//! used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is `col * 1000 + row`, so `grid[row * width + col]`
/// identifies its own position.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);
/// assert_eq!(grid[10], 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a precipitation amount grid (mm) with a deterministic sparse pattern.
///
/// Roughly a quarter of the cells get rain, up to 50 mm, in steps of 0.25 mm
/// so the values survive 16-bit simple packing without rounding.
pub fn create_precipitation_grid(width: usize, height: usize, seed: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let hash = simple_hash(col as u32, row as u32, seed);
            let precip = if hash % 4 == 0 {
                (hash % 200) as f32 * 0.25
            } else {
                0.0
            };
            data.push(precip);
        }
    }
    data
}

/// Creates `steps` accumulated precipitation grids.
///
/// Each grid is the previous one plus a fresh precipitation increment, so the
/// series is non-decreasing per cell like a real accumulated field.
pub fn create_accumulation_series(width: usize, height: usize, steps: usize) -> Vec<Vec<f32>> {
    let mut series: Vec<Vec<f32>> = Vec::with_capacity(steps);
    let mut total = vec![0.0f32; width * height];

    for step in 0..steps {
        if step > 0 {
            let increment = create_precipitation_grid(width, height, step as u32);
            for (acc, inc) in total.iter_mut().zip(increment) {
                *acc += inc;
            }
        }
        series.push(total.clone());
    }

    series
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Creates a grid with NaN values at the given (col, row) positions, zeros elsewhere.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}
