//! Minimal OPeNDAP (DAP2) client for THREDDS `dodsC` endpoints.
//!
//! Only the three text services are used:
//!
//! - `.dds`   dataset structure (variables, dimension names and sizes)
//! - `.das`   attributes (units, packing, fill values)
//! - `.ascii` values for a constraint expression such as
//!   `temperature[0:23][0][512][300]`
//!
//! Reading the ASCII service keeps the importer free of a netCDF/HDF5
//! toolchain; requests are always hyperslabs of a few cells, so the text
//! overhead is irrelevant.

use std::collections::HashMap;

use reqwest::blocking::Client;

use crate::ingest::fetch_text;
use crate::model::ImportError;

// ============================================================================
// Dataset structure (DDS)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub data_type: String,
    pub dims: Vec<Dimension>,
}

impl Variable {
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.size).collect()
    }

    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }
}

const DAP_TYPES: &[&str] = &[
    "Byte", "Int8", "UInt8", "Int16", "UInt16", "Int32", "UInt32", "Int64", "UInt64", "Float32",
    "Float64", "String", "Url",
];

/// Parses `Float64 lat[Y = 902][X = 2602];` into a variable declaration.
fn parse_declaration(line: &str) -> Option<Variable> {
    let line = line.trim().strip_suffix(';')?;
    let (data_type, rest) = line.split_once(char::is_whitespace)?;
    if !DAP_TYPES.contains(&data_type) {
        return None;
    }
    let rest = rest.trim();
    let (name, dims_part) = match rest.find('[') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };

    let mut dims = Vec::new();
    for chunk in dims_part.split('[').filter(|c| !c.trim().is_empty()) {
        let inner = chunk.trim().strip_suffix(']')?;
        let (dim_name, size) = match inner.split_once('=') {
            Some((n, s)) => (n.trim().to_string(), s.trim().parse().ok()?),
            None => (String::new(), inner.trim().parse().ok()?),
        };
        dims.push(Dimension { name: dim_name, size });
    }

    Some(Variable {
        name: name.trim().to_string(),
        data_type: data_type.to_string(),
        dims,
    })
}

/// Parses a DDS document into its top-level variables.
///
/// For `Grid` entries only the `ARRAY:` member is returned; map vectors are
/// listed separately as top-level arrays in THREDDS output anyway.
pub fn parse_dds(text: &str) -> Result<Vec<Variable>, ImportError> {
    if !text.trim_start().starts_with("Dataset") {
        return Err(ImportError::Parse("DDS does not start with 'Dataset'".to_string()));
    }

    let mut variables = Vec::new();
    let mut in_grid = false;
    let mut in_maps = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Grid") {
            in_grid = true;
            in_maps = false;
            continue;
        }
        if in_grid {
            match trimmed {
                "ARRAY:" => in_maps = false,
                "MAPS:" => in_maps = true,
                t if t.starts_with('}') => {
                    in_grid = false;
                    in_maps = false;
                }
                t if !in_maps => {
                    if let Some(var) = parse_declaration(t) {
                        variables.push(var);
                    }
                }
                _ => {}
            }
            continue;
        }
        if let Some(var) = parse_declaration(trimmed) {
            variables.push(var);
        }
    }

    Ok(variables)
}

// ============================================================================
// Attributes (DAS)
// ============================================================================

/// Attributes of a single variable, values kept as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: HashMap<String, String>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// First numeric value of the attribute.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.split(',').next()?.trim().parse().ok()
    }

    /// Packing and fill settings for decoding raw values.
    pub fn packing(&self) -> Packing {
        Packing {
            scale_factor: self.get_f64("scale_factor").unwrap_or(1.0),
            add_offset: self.get_f64("add_offset").unwrap_or(0.0),
            fill_value: self.get_f64("_FillValue"),
            missing_value: self.get_f64("missing_value"),
        }
    }
}

/// Parses a DAS document into attributes per variable.
pub fn parse_das(text: &str) -> Result<HashMap<String, Attributes>, ImportError> {
    if !text.trim_start().starts_with("Attributes") {
        return Err(ImportError::Parse("DAS does not start with 'Attributes'".to_string()));
    }

    let mut result: HashMap<String, Attributes> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = trimmed.strip_suffix('{') {
            stack.push(name.trim().to_string());
            continue;
        }
        if trimmed.starts_with('}') {
            stack.pop();
            continue;
        }
        // stack[0] is "Attributes", stack[1] the variable
        if stack.len() != 2 {
            continue;
        }
        let Some(body) = trimmed.strip_suffix(';') else {
            continue;
        };
        let mut parts = body.splitn(3, char::is_whitespace);
        let (Some(_ty), Some(name), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        result
            .entry(stack[1].clone())
            .or_default()
            .values
            .insert(name.to_string(), value);
    }

    Ok(result)
}

/// CF packing: `value = raw * scale_factor + add_offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packing {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub fill_value: Option<f64>,
    pub missing_value: Option<f64>,
}

impl Default for Packing {
    fn default() -> Self {
        Self { scale_factor: 1.0, add_offset: 0.0, fill_value: None, missing_value: None }
    }
}

/// netCDF default fill for floats is 9.96921e36; anything this large is fill.
const FILL_THRESHOLD: f64 = 1e30;

impl Packing {
    pub fn unpack(&self, raw: f64) -> Option<f64> {
        if !raw.is_finite() || raw.abs() >= FILL_THRESHOLD {
            return None;
        }
        if self.fill_value == Some(raw) || self.missing_value == Some(raw) {
            return None;
        }
        Some(raw * self.scale_factor + self.add_offset)
    }
}

// ============================================================================
// Values (ASCII)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DapArray {
    /// Name as printed by the server, e.g. `temperature.temperature`.
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl DapArray {
    /// Matches `var` itself or the array member of a Grid named `var`.
    fn is(&self, var: &str) -> bool {
        self.name == var || self.name.split_once('.').is_some_and(|(g, m)| g == var && m == var)
    }
}

fn parse_header(field: &str) -> (String, Vec<usize>) {
    let field = field.trim();
    match field.find('[') {
        Some(i) => {
            let shape = field[i..]
                .split('[')
                .filter_map(|c| c.trim().strip_suffix(']')?.trim().parse().ok())
                .collect();
            (field[..i].to_string(), shape)
        }
        None => (field.to_string(), Vec::new()),
    }
}

fn parse_number(s: &str) -> Result<f64, ImportError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    s.parse()
        .map_err(|_| ImportError::Parse(format!("'{}' is not a number", s)))
}

/// Parses a `.ascii` response into the arrays it contains, in order.
pub fn parse_ascii(text: &str) -> Result<Vec<DapArray>, ImportError> {
    let body = text
        .split_once("\n---")
        .map(|(_, rest)| rest.split_once('\n').map(|(_, b)| b).unwrap_or(""))
        .ok_or_else(|| ImportError::Parse("ASCII response has no data separator".to_string()))?;

    let mut arrays: Vec<DapArray> = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let first = fields.next().unwrap_or("").trim();

        let starts_with_name = first
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let is_nan = first.eq_ignore_ascii_case("nan");

        if starts_with_name && !is_nan {
            let (name, shape) = parse_header(first);
            let mut array = DapArray { name, shape, values: Vec::new() };
            for f in fields {
                array.values.push(parse_number(f)?);
            }
            arrays.push(array);
            continue;
        }

        let current = arrays
            .last_mut()
            .ok_or_else(|| ImportError::Parse(format!("data line before any header: '{}'", line)))?;
        if !first.starts_with('[') {
            current.values.push(parse_number(first)?);
        }
        for f in fields {
            current.values.push(parse_number(f)?);
        }
    }

    for array in &arrays {
        let expected: usize = array.shape.iter().product();
        if !array.shape.is_empty() && expected != array.values.len() {
            return Err(ImportError::Parse(format!(
                "array '{}' declares {} values but holds {}",
                array.name,
                expected,
                array.values.len()
            )));
        }
    }

    Ok(arrays)
}

/// Picks the array for `var` out of a parsed ASCII response.
pub fn take_array(arrays: Vec<DapArray>, var: &str) -> Result<DapArray, ImportError> {
    arrays
        .into_iter()
        .find(|a| a.is(var))
        .ok_or_else(|| ImportError::VariableNotFound(var.to_string()))
}

// ============================================================================
// Constraint expressions
// ============================================================================

/// Builder for a single-variable hyperslab, `var[start:stride:stop]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperslab {
    var: String,
    ranges: Vec<(usize, usize, usize)>,
}

impl Hyperslab {
    pub fn new(var: &str) -> Self {
        Self { var: var.to_string(), ranges: Vec::new() }
    }

    /// Single index along the next dimension.
    pub fn index(mut self, i: usize) -> Self {
        self.ranges.push((i, 1, i));
        self
    }

    /// Inclusive range along the next dimension.
    pub fn range(mut self, start: usize, stop: usize) -> Self {
        self.ranges.push((start, 1, stop));
        self
    }

    pub fn strided(mut self, start: usize, stride: usize, stop: usize) -> Self {
        self.ranges.push((start, stride.max(1), stop));
        self
    }

    /// Number of values the constraint selects.
    pub fn count(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(a, s, b)| if b < a { 0 } else { (b - a) / s + 1 })
            .product()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.ranges
            .iter()
            .map(|&(a, s, b)| if b < a { 0 } else { (b - a) / s + 1 })
            .collect()
    }

    pub fn expr(&self) -> String {
        let mut out = self.var.clone();
        for &(a, s, b) in &self.ranges {
            if a == b {
                out.push_str(&format!("[{}]", a));
            } else if s == 1 {
                out.push_str(&format!("[{}:{}]", a, b));
            } else {
                out.push_str(&format!("[{}:{}:{}]", a, s, b));
            }
        }
        out
    }
}

// ============================================================================
// Remote dataset
// ============================================================================

/// One OPeNDAP dataset, addressed by its `dodsC` URL.
#[derive(Debug, Clone)]
pub struct DapDataset {
    pub url: String,
}

impl DapDataset {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string() }
    }

    pub fn dds(&self, client: &Client) -> Result<Vec<Variable>, ImportError> {
        parse_dds(&fetch_text(client, &format!("{}.dds", self.url))?)
    }

    pub fn das(&self, client: &Client) -> Result<HashMap<String, Attributes>, ImportError> {
        parse_das(&fetch_text(client, &format!("{}.das", self.url))?)
    }

    /// Whether the server can describe the dataset.
    pub fn exists(&self, client: &Client) -> bool {
        self.dds(client).is_ok()
    }

    /// Fetches one hyperslab and returns its raw (still packed) values.
    pub fn fetch(&self, client: &Client, slab: &Hyperslab) -> Result<DapArray, ImportError> {
        let expr = slab.expr().replace('[', "%5B").replace(']', "%5D");
        let url = format!("{}.ascii?{}", self.url, expr);
        let arrays = parse_ascii(&fetch_text(client, &url)?)?;
        let array = take_array(arrays, &slab.var)?;
        if array.values.len() != slab.count() {
            return Err(ImportError::Parse(format!(
                "{} returned {} values, expected {}",
                slab.expr(),
                array.values.len(),
                slab.count()
            )));
        }
        Ok(array)
    }

    /// Fetches a whole one-dimensional variable.
    pub fn fetch_vector(&self, client: &Client, var: &Variable) -> Result<Vec<f64>, ImportError> {
        let size = var.dims.first().map(|d| d.size).unwrap_or(1);
        if size == 0 {
            return Ok(Vec::new());
        }
        Ok(self.fetch(client, &Hyperslab::new(&var.name).range(0, size - 1))?.values)
    }
}

pub fn find_variable<'a>(vars: &'a [Variable], name: &str) -> Result<&'a Variable, ImportError> {
    vars.iter()
        .find(|v| v.name == name)
        .ok_or_else(|| ImportError::VariableNotFound(name.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DDS: &str = "Dataset {
    Float64 time[time = 24];
    Float64 depth[depth = 16];
    Float64 lat[Y = 902][X = 2602];
    Float64 h[Y = 902][X = 2602];
    Int32 projection_stere;
    Grid {
     ARRAY:
        Int16 temperature[time = 24][depth = 16][Y = 902][X = 2602];
     MAPS:
        Float64 time[time = 24];
        Float64 depth[depth = 16];
        Float64 Y[Y = 902];
        Float64 X[X = 2602];
    } temperature;
} fou-hi/norkyst800m-1h/NorKyst-800m_ZDEPTHS_his.an.2021041100.nc;
";

    const DAS: &str = r#"Attributes {
    time {
        String long_name "time";
        String units "seconds since 1970-01-01 00:00:00";
        String calendar "gregorian";
    }
    temperature {
        Int16 _FillValue -32767;
        Float32 scale_factor 0.01;
        Float32 add_offset 10.0;
        String units "Celsius";
    }
    NC_GLOBAL {
        String title "NorKyst-800m";
        DODS_EXTRA {
            String Unlimited_Dimension "time";
        }
    }
}
"#;

    #[test]
    fn test_parse_dds_skips_grid_maps() {
        let vars = parse_dds(DDS).unwrap();
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["time", "depth", "lat", "h", "projection_stere", "temperature"]);

        let temp = find_variable(&vars, "temperature").unwrap();
        assert_eq!(temp.data_type, "Int16");
        assert_eq!(temp.shape(), vec![24, 16, 902, 2602]);
        assert_eq!(temp.dim_index("depth"), Some(1));
        assert!(find_variable(&vars, "zeta").is_err());
        assert!(find_variable(&vars, "projection_stere").unwrap().dims.is_empty());
    }

    #[test]
    fn test_parse_dds_rejects_html_error_page() {
        assert!(parse_dds("<html>404</html>").is_err());
    }

    #[test]
    fn test_parse_das_packing() {
        let das = parse_das(DAS).unwrap();
        assert_eq!(das["time"].get("units"), Some("seconds since 1970-01-01 00:00:00"));
        let packing = das["temperature"].packing();
        assert_eq!(packing.fill_value, Some(-32767.0));
        assert!((packing.unpack(1234.0).unwrap() - 22.34).abs() < 1e-9);
        assert_eq!(packing.unpack(-32767.0), None);
        // nested containers are not variables
        assert!(!das.contains_key("DODS_EXTRA"));
        assert_eq!(das["NC_GLOBAL"].get("title"), Some("NorKyst-800m"));
    }

    #[test]
    fn test_default_packing_passes_values_through() {
        let p = Packing::default();
        assert_eq!(p.unpack(3.5), Some(3.5));
        assert_eq!(p.unpack(f64::NAN), None);
        assert_eq!(p.unpack(9.96921e36), None);
    }

    #[test]
    fn test_parse_ascii_grid_and_maps() {
        let text = "Dataset {\n    Grid { } temperature;\n} x;\n---------------------------------------------\ntemperature.temperature[2][1][1][1]\n[0][0][0], 1234\n[1][0][0], 1240\n\ntemperature.time[2]\n1.6180992E9, 1.6181028E9\n";
        let arrays = parse_ascii(text).unwrap();
        assert_eq!(arrays.len(), 2);
        let temp = take_array(arrays, "temperature").unwrap();
        assert_eq!(temp.shape, vec![2, 1, 1, 1]);
        assert_eq!(temp.values, vec![1234.0, 1240.0]);
    }

    #[test]
    fn test_parse_ascii_plain_2d_and_1d() {
        let text = "Dataset {\n} x;\n---\nlat[2][3]\n[0], 60.0, 60.0, 60.0\n[1], 60.1, 60.1, 60.1\n\ntime[3]\n0.0, 3600.0, NaN\n";
        let arrays = parse_ascii(text).unwrap();
        assert_eq!(arrays[0].name, "lat");
        assert_eq!(arrays[0].values.len(), 6);
        assert_eq!(arrays[1].values[1], 3600.0);
        assert!(arrays[1].values[2].is_nan());
    }

    #[test]
    fn test_parse_ascii_shape_mismatch_is_error() {
        let text = "Dataset {\n} x;\n---\ntime[3]\n0.0, 3600.0\n";
        assert!(parse_ascii(text).is_err());
    }

    #[test]
    fn test_parse_ascii_without_separator_is_error() {
        assert!(parse_ascii("Error { code = 404; }").is_err());
    }

    #[test]
    fn test_hyperslab_expression() {
        let slab = Hyperslab::new("temperature").range(3, 23).index(1).index(512).index(300);
        assert_eq!(slab.expr(), "temperature[3:23][1][512][300]");
        assert_eq!(slab.count(), 21);

        let coarse = Hyperslab::new("lat").strided(0, 10, 901).strided(0, 10, 2601);
        assert_eq!(coarse.expr(), "lat[0:10:901][0:10:2601]");
        assert_eq!(coarse.shape(), vec![91, 261]);
    }
}
