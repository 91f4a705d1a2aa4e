use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-valued raster sample; NaN marks no-data
pub type Sample = f32;

/// 2D raster layer (y x x)
pub type Layer = Array2<Sample>;

/// Geospatial bounding box in the coordinates of its CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

/// Affine geotransform, in GDAL coefficient order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square-ish pixels (`pixel_height` is negative)
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Pixel grid shared by every layer of a cube or feature grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// CRS definition understood by GDAL, e.g. "EPSG:6933"
    pub crs: String,
}

impl GeoBox {
    pub fn new(width: usize, height: usize, transform: GeoTransform, crs: impl Into<String>) -> Self {
        Self {
            width,
            height,
            transform,
            crs: crs.into(),
        }
    }

    /// Array shape of one 2D layer on this grid
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Extent of the grid, ignoring rotation terms
    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x0 = t.top_left_x;
        let x1 = t.top_left_x + t.pixel_width * self.width as f64;
        let y0 = t.top_left_y;
        let y1 = t.top_left_y + t.pixel_height * self.height as f64;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

/// Inclusive range of UTC instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> FeatureResult<Self> {
        if end < start {
            return Err(FeatureError::InvalidQuery(format!(
                "time range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole calendar year `year`, like a bare "2019" in a datacube query
    pub fn year(year: i32) -> FeatureResult<Self> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| FeatureError::InvalidQuery(format!("invalid year: {}", year)))?;
        let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| FeatureError::InvalidQuery(format!("invalid year: {}", year)))?;

        Self::new(
            Utc.from_utc_datetime(&first),
            Utc.from_utc_datetime(&next) - Duration::nanoseconds(1),
        )
    }

    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        *t >= self.start && *t <= self.end
    }
}

/// Spatio-temporal load query, forwarded as-is to the data-cube loaders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    /// x (longitude/easting) range in `crs`
    pub x: Option<(f64, f64)>,
    /// y (latitude/northing) range in `crs`
    pub y: Option<(f64, f64)>,
    /// CRS of `x` and `y`; geographic when unset
    pub crs: Option<String>,
    pub time: Option<TimeRange>,
    pub output_crs: Option<String>,
    pub resolution: Option<(f64, f64)>,
    pub resampling: Option<String>,
    /// Loader parameters this crate does not interpret
    pub extra: BTreeMap<String, String>,
}

impl Query {
    /// Copy of the query with its time range replaced
    pub fn with_time(&self, time: TimeRange) -> Self {
        let mut query = self.clone();
        query.time = Some(time);
        query
    }

    /// Spatial extent, or `InvalidQuery` when x/y are missing
    pub fn bounding_box(&self) -> FeatureResult<BoundingBox> {
        match (self.x, self.y) {
            (Some((x0, x1)), Some((y0, y1))) => Ok(BoundingBox {
                min_x: x0.min(x1),
                max_x: x0.max(x1),
                min_y: y0.min(y1),
                max_y: y0.max(y1),
            }),
            _ => Err(FeatureError::InvalidQuery(
                "query needs both x and y ranges".to_string(),
            )),
        }
    }

    pub fn is_geographic(&self) -> bool {
        match self.crs.as_deref() {
            None => true,
            Some(crs) => {
                let crs = crs.to_ascii_uppercase();
                crs == "EPSG:4326" || crs == "WGS84" || crs == "OGC:CRS84"
            }
        }
    }

    /// Longitude of the query centre, when the extent is geographic
    pub fn center_longitude(&self) -> Option<f64> {
        if !self.is_geographic() {
            return None;
        }
        self.bounding_box().ok().map(|bbox| bbox.center().0)
    }
}

/// Error types for feature assembly
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data available: {0}")]
    DataUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Missing measurement: {0}")]
    MissingMeasurement(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for feature operations
pub type FeatureResult<T> = Result<T, FeatureError>;
