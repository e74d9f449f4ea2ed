//! Point timeseries from daily model files on THREDDS.
//!
//! Both NorKyst-800 and the post-processed forecasts publish one OPeNDAP
//! dataset per day. Extracting a timeseries at a site means:
//!
//! 1. building the list of daily URLs for the period and dropping leading
//!    days missing from the catalogue,
//! 2. locating the wet grid cell nearest to the site (cached),
//! 3. reading each file's time axis and keeping the span from the last step
//!    at or before the start to the first step at or after the end,
//! 4. fetching the variable at the cell for those steps, file by file.
//!
//! The cell search is done in two passes so that the full curvilinear
//! coordinate grids (millions of cells) never need to be downloaded: a
//! strided pass over the whole domain, then a full-resolution window around
//! the coarse hit.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::Client;

use crate::geo::{Grid2, min_spacing_km, nearest_wet_cell};
use crate::ingest::opendap::{self, DapDataset, Hyperslab, Packing, Variable};
use crate::logging::{self, DataSource};
use crate::model::{ImportError, TimeSeries};
use crate::timeutil::{cf_to_utc, days_inclusive, parse_cf_units};

const TIME_VAR: &str = "time";
const DEPTH_DIM: &str = "depth";

/// A gridded product published as one OPeNDAP dataset per day.
#[derive(Debug, Clone, PartialEq)]
pub struct GridProduct {
    pub name: String,
    /// `strftime` pattern for the daily dataset URL.
    pub url_template: String,
    pub lat_var: String,
    pub lon_var: String,
    /// Bathymetry used to mask land; cells equal to its minimum are land.
    pub mask_var: Option<String>,
    pub coarse_stride: usize,
}

impl GridProduct {
    pub fn url_for(&self, day: NaiveDate) -> String {
        day.format(&self.url_template).to_string()
    }

    pub fn daily_urls(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
        days_inclusive(start, end)
            .into_iter()
            .map(|day| self.url_for(day))
            .collect()
    }
}

/// The model cell used for a site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub row: usize,
    pub col: usize,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// One daily file with its decoded time axis.
#[derive(Debug, Clone)]
struct FileAxis {
    dataset: DapDataset,
    times: Vec<DateTime<Utc>>,
}

pub struct GridExtractor<'a> {
    client: &'a Client,
    product: GridProduct,
    source: DataSource,
    urls: Vec<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    axes: Option<Vec<FileAxis>>,
    point: Option<(f64, f64, GridPoint)>,
}

impl<'a> GridExtractor<'a> {
    /// Extractor over the daily files covering `[start, end]`.
    pub fn new(
        client: &'a Client,
        product: GridProduct,
        source: DataSource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let urls = product.daily_urls(start, end);
        Self {
            client,
            product,
            source,
            urls,
            start: Some(start),
            end: Some(end),
            axes: None,
            point: None,
        }
    }

    /// Extractor over explicit dataset URLs, without a time window.
    pub fn with_files(client: &'a Client, product: GridProduct, source: DataSource, urls: Vec<String>) -> Self {
        Self {
            client,
            product,
            source,
            urls,
            start: None,
            end: None,
            axes: None,
            point: None,
        }
    }

    pub fn product(&self) -> &GridProduct {
        &self.product
    }

    /// The first dataset in the period that the server can describe.
    fn first_dataset(&self) -> Result<(DapDataset, Vec<Variable>), ImportError> {
        for url in &self.urls {
            let dataset = DapDataset::new(url);
            match dataset.dds(self.client) {
                Ok(vars) => return Ok((dataset, vars)),
                Err(e) => logging::debug(
                    self.source,
                    None,
                    &format!("{} not available ({}), trying next day", url, e),
                ),
            }
        }
        Err(ImportError::NoData(format!(
            "no {} file could be opened for the requested period",
            self.product.name
        )))
    }

    // ------------------------------------------------------------------------
    // Cell search
    // ------------------------------------------------------------------------

    /// Nearest wet cell to `(lat, lon)`. The result is cached per site.
    pub fn locate(&mut self, lat: f64, lon: f64) -> Result<GridPoint, ImportError> {
        if let Some((clat, clon, point)) = self.point {
            if clat == lat && clon == lon {
                return Ok(point);
            }
        }

        let (dataset, vars) = self.first_dataset()?;
        let lat_var = opendap::find_variable(&vars, &self.product.lat_var)?;
        if lat_var.dims.len() != 2 {
            return Err(ImportError::Parse(format!(
                "{} must be a 2-D coordinate, has {} dimensions",
                lat_var.name,
                lat_var.dims.len()
            )));
        }
        let (rows, cols) = (lat_var.dims[0].size, lat_var.dims[1].size);
        if rows == 0 || cols == 0 {
            return Err(ImportError::NoData(format!("{} grid is empty", self.product.name)));
        }
        let s = self.product.coarse_stride.max(1);

        // Coarse pass over the whole domain.
        let coarse = |var: &str| Hyperslab::new(var).strided(0, s, rows - 1).strided(0, s, cols - 1);
        let c_lat = self.fetch_grid(&dataset, &coarse(&self.product.lat_var))?;
        let c_lon = self.fetch_grid(&dataset, &coarse(&self.product.lon_var))?;
        let (c_mask, land_value) = match &self.product.mask_var {
            Some(mask_var) => {
                let h = self.fetch_grid(&dataset, &coarse(mask_var))?;
                let land_value = h.values.iter().copied().fold(f64::INFINITY, f64::min);
                (Some(h.land_mask()), Some(land_value))
            }
            None => (None, None),
        };
        let (cr, cc, coarse_km) = nearest_wet_cell(lat, lon, &c_lat, &c_lon, c_mask.as_deref())
            .ok_or_else(|| ImportError::NoData("coarse grid has no candidate cell".to_string()))?;

        // Wet cells the strided pass skipped lie within `coarse_km` of the
        // site. The full-resolution window is centred on the coarse cell
        // nearest the site, land or not, and spans that circle.
        let (nr, nc, _) = nearest_wet_cell(lat, lon, &c_lat, &c_lon, None)
            .ok_or_else(|| ImportError::NoData("coarse grid has no candidate cell".to_string()))?;
        let extent = rows.max(cols);
        let radius = match min_spacing_km(&c_lat, &c_lon) {
            Some(coarse_step_km) => {
                let cells = (coarse_km * s as f64 / coarse_step_km).ceil().min(extent as f64);
                s + cells as usize + 1
            }
            None => extent,
        };
        let (mut r0, mut r1) = window(nr * s, radius, rows);
        let (mut c0, mut c1) = window(nc * s, radius, cols);
        r0 = r0.min(cr * s);
        r1 = r1.max(cr * s);
        c0 = c0.min(cc * s);
        c1 = c1.max(cc * s);
        let fine = |var: &str| Hyperslab::new(var).range(r0, r1).range(c0, c1);
        let f_lat = self.fetch_grid(&dataset, &fine(&self.product.lat_var))?;
        let f_lon = self.fetch_grid(&dataset, &fine(&self.product.lon_var))?;
        let f_mask = match (&self.product.mask_var, land_value) {
            (Some(mask_var), Some(land_value)) => {
                let h = self.fetch_grid(&dataset, &fine(mask_var))?;
                Some(h.values.iter().map(|&v| v == land_value).collect::<Vec<_>>())
            }
            _ => None,
        };
        let (fr, fc, distance_km) = nearest_wet_cell(lat, lon, &f_lat, &f_lon, f_mask.as_deref())
            .ok_or_else(|| ImportError::NoData("search window has no candidate cell".to_string()))?;

        let point = GridPoint {
            row: r0 + fr,
            col: c0 + fc,
            lat: f_lat.get(fr, fc),
            lon: f_lon.get(fr, fc),
            distance_km,
        };
        logging::info(
            self.source,
            None,
            &format!(
                "Model coordinates (x,y = {},{}): {:.4}, {:.4} ({:.2} km from site)",
                point.col, point.row, point.lat, point.lon, point.distance_km
            ),
        );
        self.point = Some((lat, lon, point));
        Ok(point)
    }

    fn fetch_grid(&self, dataset: &DapDataset, slab: &Hyperslab) -> Result<Grid2, ImportError> {
        let shape = slab.shape();
        let array = dataset.fetch(self.client, slab)?;
        Grid2::new(shape[0], shape[1], array.values)
            .ok_or_else(|| ImportError::Parse(format!("{} is not a 2-D grid", slab.expr())))
    }

    /// Value of a static 2-D field (e.g. bathymetry) at the site's cell.
    pub fn static_value(&mut self, var: &str, lat: f64, lon: f64) -> Result<Option<f64>, ImportError> {
        let point = self.locate(lat, lon)?;
        let (dataset, _) = self.first_dataset()?;
        let packing = dataset
            .das(self.client)?
            .get(var)
            .map(|a| a.packing())
            .unwrap_or_default();
        let array = dataset.fetch(self.client, &Hyperslab::new(var).index(point.row).index(point.col))?;
        Ok(array.values.first().and_then(|&v| packing.unpack(v)))
    }

    // ------------------------------------------------------------------------
    // Time axes
    // ------------------------------------------------------------------------

    fn load_axes(&mut self) -> Result<Vec<FileAxis>, ImportError> {
        if let Some(axes) = &self.axes {
            return Ok(axes.clone());
        }

        let (first, _) = self.first_dataset()?;
        let first_pos = self.urls.iter().position(|u| *u == first.url).unwrap_or(0);

        let mut axes = vec![FileAxis { times: self.read_time_axis(&first)?, dataset: first }];
        for url in &self.urls[first_pos + 1..] {
            let dataset = DapDataset::new(url);
            match self.read_time_axis(&dataset) {
                Ok(times) => axes.push(FileAxis { dataset, times }),
                Err(e) => logging::warn(self.source, None, &format!("Skipping {}: {}", url, e)),
            }
        }

        self.axes = Some(axes.clone());
        Ok(axes)
    }

    fn read_time_axis(&self, dataset: &DapDataset) -> Result<Vec<DateTime<Utc>>, ImportError> {
        let vars = dataset.dds(self.client)?;
        let time_var = opendap::find_variable(&vars, TIME_VAR)?;
        let raw = dataset.fetch_vector(self.client, time_var)?;
        let das = dataset.das(self.client)?;
        let units = das
            .get(TIME_VAR)
            .and_then(|a| a.get("units"))
            .ok_or_else(|| ImportError::Parse(format!("{} has no time units", dataset.url)))?;
        let (unit_seconds, base) = parse_cf_units(units)
            .ok_or_else(|| ImportError::Parse(format!("unsupported time units '{}'", units)))?;
        Ok(raw.into_iter().map(|v| cf_to_utc(v, unit_seconds, base)).collect())
    }

    // ------------------------------------------------------------------------
    // Extraction
    // ------------------------------------------------------------------------

    /// Timeseries of `var` at the cell nearest to `(lat, lon)`.
    ///
    /// `depth` selects a z-level for variables with a `depth` dimension (0 m
    /// when not given) and is ignored for single-level variables. The single
    /// column is named after `var`.
    pub fn extract(
        &mut self,
        var: &str,
        depth: Option<f64>,
        lat: f64,
        lon: f64,
    ) -> Result<TimeSeries, ImportError> {
        let point = self.locate(lat, lon)?;
        let axes = self.load_axes()?;

        let all_times: Vec<DateTime<Utc>> = axes.iter().flat_map(|a| a.times.iter().copied()).collect();
        let (lo, hi) = match time_window(&all_times, self.start, self.end) {
            Some(bounds) => bounds,
            None => return Err(ImportError::NoData(format!("{} files have no time steps", self.product.name))),
        };

        // Structure, packing and level index come from the first file.
        let first = &axes[0].dataset;
        let vars = first.dds(self.client)?;
        let variable = opendap::find_variable(&vars, var)?.clone();
        let packing: Packing = first
            .das(self.client)?
            .get(var)
            .map(|a| a.packing())
            .unwrap_or_default();
        let lat_var = opendap::find_variable(&vars, &self.product.lat_var)?;
        let horizontal: Vec<String> = lat_var.dims.iter().map(|d| d.name.clone()).collect();
        let depth_index = match variable.dim_index(DEPTH_DIM) {
            Some(_) => {
                let depth_var = opendap::find_variable(&vars, DEPTH_DIM)?;
                let levels = first.fetch_vector(self.client, depth_var)?;
                Some(level_index(&levels, depth.unwrap_or(0.0))?)
            }
            None => None,
        };

        let mut times = Vec::new();
        let mut values = Vec::new();
        for (i, axis) in axes.iter().enumerate() {
            let Some((t0, t1)) = index_span(&axis.times, lo, hi) else {
                continue;
            };
            logging::info(self.source, None, &format!("Processing {}", axis.dataset.url));

            let slab = build_slab(&variable, &horizontal, (t0, t1), depth_index, point);
            match axis.dataset.fetch(self.client, &slab) {
                Ok(array) => {
                    times.extend_from_slice(&axis.times[t0..=t1]);
                    values.extend(array.values.into_iter().map(|v| packing.unpack(v)));
                }
                Err(e) if i == 0 => return Err(e),
                Err(e) => logging::warn(
                    self.source,
                    None,
                    &format!("Skipping {}: {}", axis.dataset.url, e),
                ),
            }
        }

        let mut series = TimeSeries::new(times);
        series.push_column(var, values)?;
        Ok(series)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Inclusive index range `[center - radius, center + radius]` clamped to
/// `[0, size)`.
fn window(center: usize, radius: usize, size: usize) -> (usize, usize) {
    let lo = center.saturating_sub(radius);
    let hi = (center + radius).min(size.saturating_sub(1));
    (lo, hi)
}

/// Outer time bounds for a request: the last step at or before `start` and
/// the first step at or after `end`. Falls back to the first/last step when
/// the axis does not reach that far, and to the full axis without bounds.
pub fn time_window(
    times: &[DateTime<Utc>],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = *times.iter().min()?;
    let max = *times.iter().max()?;
    let lo = start
        .and_then(|s| times.iter().filter(|&&t| t <= s).max().copied())
        .unwrap_or(min);
    let hi = end
        .and_then(|e| times.iter().filter(|&&t| t >= e).min().copied())
        .unwrap_or(max);
    Some((lo, hi))
}

/// First and last index of `times` inside `[lo, hi]`.
fn index_span(times: &[DateTime<Utc>], lo: DateTime<Utc>, hi: DateTime<Utc>) -> Option<(usize, usize)> {
    let first = times.iter().position(|&t| t >= lo && t <= hi)?;
    let last = times.iter().rposition(|&t| t >= lo && t <= hi)?;
    Some((first, last))
}

/// Index of an exact z-level.
pub fn level_index(levels: &[f64], depth: f64) -> Result<usize, ImportError> {
    levels
        .iter()
        .position(|&l| (l - depth).abs() < 1e-6)
        .ok_or(ImportError::DepthNotAvailable(depth))
}

fn build_slab(
    variable: &Variable,
    horizontal: &[String],
    (t0, t1): (usize, usize),
    depth_index: Option<usize>,
    point: GridPoint,
) -> Hyperslab {
    let mut slab = Hyperslab::new(&variable.name);
    for dim in &variable.dims {
        slab = if dim.name == TIME_VAR {
            slab.range(t0, t1)
        } else if horizontal.first() == Some(&dim.name) {
            slab.index(point.row)
        } else if horizontal.get(1) == Some(&dim.name) {
            slab.index(point.col)
        } else if dim.name == DEPTH_DIM {
            slab.index(depth_index.unwrap_or(0))
        } else {
            // height0, ensemble_member, ... : first entry
            slab.index(0)
        };
    }
    slab
}
