//! Great-circle distances and nearest grid cell search.

/// Mean earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance in kilometres between two `(lat, lon)` points given
/// in degrees.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// A 2-D field stored row-major as `rows x cols`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2 {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl Grid2 {
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Option<Self> {
        (values.len() == rows * cols).then_some(Self { rows, cols, values })
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Land mask from model bathymetry: a cell is land when its depth equals
    /// the smallest depth in the field.
    pub fn land_mask(&self) -> Vec<bool> {
        let land_value = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        self.values.iter().map(|&h| h == land_value).collect()
    }
}

/// Smallest distance between horizontally or vertically adjacent cells, in
/// kilometres. `None` when the grid has no adjacent pair with finite,
/// distinct coordinates.
pub fn min_spacing_km(grid_lat: &Grid2, grid_lon: &Grid2) -> Option<f64> {
    let mut min: Option<f64> = None;
    for r in 0..grid_lat.rows {
        for c in 0..grid_lat.cols {
            let here = (grid_lat.get(r, c), grid_lon.get(r, c));
            for (nr, nc) in [(r + 1, c), (r, c + 1)] {
                if nr >= grid_lat.rows || nc >= grid_lat.cols {
                    continue;
                }
                let d = haversine_km(here, (grid_lat.get(nr, nc), grid_lon.get(nr, nc)));
                if d.is_finite() && d > 0.0 && min.is_none_or(|m| d < m) {
                    min = Some(d);
                }
            }
        }
    }
    min
}

/// Index `(row, col)` and distance of the grid cell closest to
/// `(lat, lon)`, skipping cells flagged in `land`.
///
/// When `land` is `None`, or every cell is land, all cells are candidates.
/// Returns `None` only for an empty grid.
pub fn nearest_wet_cell(
    lat: f64,
    lon: f64,
    grid_lat: &Grid2,
    grid_lon: &Grid2,
    land: Option<&[bool]>,
) -> Option<(usize, usize, f64)> {
    let all_land = land.is_some_and(|mask| mask.iter().all(|&l| l));
    let mut best: Option<(usize, f64)> = None;

    for i in 0..grid_lat.values.len().min(grid_lon.values.len()) {
        if !all_land && land.is_some_and(|mask| mask.get(i).copied().unwrap_or(false)) {
            continue;
        }
        let (clat, clon) = (grid_lat.values[i], grid_lon.values[i]);
        if !clat.is_finite() || !clon.is_finite() {
            continue;
        }
        let d = haversine_km((lat, lon), (clat, clon));
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }

    best.map(|(i, d)| (i / grid_lat.cols, i % grid_lat.cols, d))
}
