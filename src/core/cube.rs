use crate::types::{FeatureError, FeatureResult, GeoBox, Layer, Sample, TimeRange};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use num_traits::Float;
use std::collections::BTreeMap;

/// One named band of a cube, shaped (time, y, x)
#[derive(Debug, Clone)]
pub struct Measurement {
    pub data: Array3<Sample>,
    /// Sentinel value marking missing pixels in native-dtype data.
    /// NaN is always treated as missing regardless of this value.
    pub nodata: Option<Sample>,
}

impl Measurement {
    pub fn is_valid(&self, value: Sample) -> bool {
        is_valid(value, self.nodata)
    }
}

fn is_valid<F: Float>(value: F, nodata: Option<F>) -> bool {
    !value.is_nan() && nodata.map_or(true, |nd| value != nd)
}

/// Mean of the valid values, NaN when there are none
fn nan_mean<F: Float>(values: impl Iterator<Item = F>, nodata: Option<F>) -> F {
    let (sum, count) = values
        .filter(|v| is_valid(*v, nodata))
        .fold((F::zero(), 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        return F::nan();
    }
    match F::from(count) {
        Some(n) => sum / n,
        None => F::nan(),
    }
}

/// Last day of the month at midnight UTC
fn month_end(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Spatio-temporal stack of named bands on a single pixel grid
#[derive(Debug, Clone)]
pub struct Cube {
    geobox: GeoBox,
    times: Vec<DateTime<Utc>>,
    measurements: IndexMap<String, Measurement>,
}

impl Cube {
    /// Create an empty cube; bands are added with `insert_measurement`
    pub fn new(geobox: GeoBox, times: Vec<DateTime<Utc>>) -> Self {
        Self {
            geobox,
            times,
            measurements: IndexMap::new(),
        }
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// Band names in insertion order
    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.measurements.keys().map(String::as_str)
    }

    pub fn measurements(&self) -> impl Iterator<Item = (&str, &Measurement)> {
        self.measurements.iter().map(|(name, m)| (name.as_str(), m))
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.measurements.is_empty()
    }

    /// Add or replace a band. Replacing keeps the band's position.
    pub fn insert_measurement(
        &mut self,
        name: impl Into<String>,
        data: Array3<Sample>,
        nodata: Option<Sample>,
    ) -> FeatureResult<()> {
        let name = name.into();
        let (height, width) = self.geobox.shape();
        let expected = (self.times.len(), height, width);

        if data.dim() != expected {
            return Err(FeatureError::Shape(format!(
                "band '{}' has shape {:?}, cube expects {:?}",
                name,
                data.dim(),
                expected
            )));
        }

        self.measurements.insert(name, Measurement { data, nodata });
        Ok(())
    }

    pub fn measurement(&self, name: &str) -> FeatureResult<&Measurement> {
        self.measurements
            .get(name)
            .ok_or_else(|| FeatureError::MissingMeasurement(name.to_string()))
    }

    /// Subset of bands, in the requested order
    pub fn select_measurements<S: AsRef<str>>(&self, names: &[S]) -> FeatureResult<Cube> {
        let mut selected = Cube::new(self.geobox.clone(), self.times.clone());
        for name in names {
            let name = name.as_ref();
            let m = self.measurement(name)?;
            selected.measurements.insert(name.to_string(), m.clone());
        }
        Ok(selected)
    }

    /// Time steps falling within `range`
    pub fn select_time(&self, range: &TimeRange) -> Cube {
        let indices: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| range.contains(t))
            .map(|(i, _)| i)
            .collect();
        self.take_times(&indices)
    }

    fn take_times(&self, indices: &[usize]) -> Cube {
        let measurements = self
            .measurements
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    Measurement {
                        data: m.data.select(Axis(0), indices),
                        nodata: m.nodata,
                    },
                )
            })
            .collect();

        Cube {
            geobox: self.geobox.clone(),
            times: indices.iter().map(|&i| self.times[i]).collect(),
            measurements,
        }
    }

    /// Drop the singleton time axis of one band
    pub fn squeeze(&self, name: &str) -> FeatureResult<Layer> {
        let m = self.measurement(name)?;
        if self.times.len() != 1 {
            return Err(FeatureError::Shape(format!(
                "cannot squeeze band '{}' with {} time steps",
                name,
                self.times.len()
            )));
        }
        Ok(m.data.index_axis(Axis(0), 0).to_owned())
    }

    /// Set every band to NaN wherever the crop mask is false or missing
    pub fn apply_mask(&self, mask: &CropMask) -> FeatureResult<Cube> {
        if mask.data.dim() != self.geobox.shape() {
            return Err(FeatureError::Shape(format!(
                "crop mask shape {:?} does not match cube grid {:?}",
                mask.data.dim(),
                self.geobox.shape()
            )));
        }
        if mask.geobox != self.geobox {
            return Err(FeatureError::Shape(
                "crop mask and cube are on different pixel grids".to_string(),
            ));
        }

        let cropland = mask.cropland();
        log::debug!(
            "Masking {} bands x {} time steps, {} crop pixels",
            self.measurements.len(),
            self.times.len(),
            cropland.iter().filter(|&&c| c).count()
        );

        let mut masked = self.clone();
        for m in masked.measurements.values_mut() {
            for mut slice in m.data.axis_iter_mut(Axis(0)) {
                Zip::from(&mut slice).and(&cropland).for_each(|v, &crop| {
                    if !crop {
                        *v = Sample::NAN;
                    }
                });
            }
        }
        Ok(masked)
    }

    /// Monthly mean per pixel, one output step per distinct calendar month,
    /// labelled with the month-end date
    pub fn resample_monthly_mean(&self) -> FeatureResult<Cube> {
        let mut months: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
        for (i, t) in self.times.iter().enumerate() {
            months.entry((t.year(), t.month())).or_default().push(i);
        }

        let labels = months
            .keys()
            .map(|&(year, month)| {
                month_end(year, month).ok_or_else(|| {
                    FeatureError::InvalidQuery(format!("cannot label month {}-{:02}", year, month))
                })
            })
            .collect::<FeatureResult<Vec<_>>>()?;

        log::debug!(
            "Resampling {} time steps into {} monthly means",
            self.times.len(),
            labels.len()
        );

        let (height, width) = self.geobox.shape();
        let mut resampled = Cube::new(self.geobox.clone(), labels);

        for (name, m) in &self.measurements {
            let mut data = Array3::<Sample>::zeros((months.len(), height, width));
            for (g, indices) in months.values().enumerate() {
                let mut out = data.index_axis_mut(Axis(0), g);
                for ((y, x), value) in out.indexed_iter_mut() {
                    *value = nan_mean(indices.iter().map(|&t| m.data[[t, y, x]]), m.nodata);
                }
            }
            resampled.insert_measurement(name.clone(), data, None)?;
        }

        Ok(resampled)
    }

    /// Stack cubes along time, sorted by timestamp
    pub fn concat_time(cubes: Vec<Cube>) -> FeatureResult<Cube> {
        let first = cubes
            .first()
            .ok_or_else(|| FeatureError::DataUnavailable("no cubes to concatenate".to_string()))?;
        let geobox = first.geobox.clone();
        let names: Vec<String> = first.measurements.keys().cloned().collect();

        for cube in &cubes[1..] {
            if cube.geobox != geobox {
                return Err(FeatureError::Shape(
                    "cannot concatenate cubes on different grids".to_string(),
                ));
            }
            if !cube.measurements.keys().eq(names.iter()) {
                return Err(FeatureError::Shape(
                    "cannot concatenate cubes with different bands".to_string(),
                ));
            }
        }

        let mut order: Vec<(DateTime<Utc>, usize, usize)> = cubes
            .iter()
            .enumerate()
            .flat_map(|(c, cube)| cube.times.iter().enumerate().map(move |(t, &time)| (time, c, t)))
            .collect();
        order.sort_by_key(|&(time, _, _)| time);

        let (height, width) = geobox.shape();
        let mut stacked = Cube::new(geobox, order.iter().map(|&(time, _, _)| time).collect());

        for name in &names {
            let data = if order.is_empty() {
                Array3::zeros((0, height, width))
            } else {
                let views: Vec<ArrayView2<Sample>> = order
                    .iter()
                    .map(|&(_, c, t)| cubes[c].measurements[name].data.index_axis(Axis(0), t))
                    .collect();
                ndarray::stack(Axis(0), &views)
                    .map_err(|e| FeatureError::Shape(format!("failed to stack '{}': {}", name, e)))?
            };
            stacked.insert_measurement(name.clone(), data, first.measurements[name].nodata)?;
        }

        Ok(stacked)
    }

    /// Fuse acquisitions sharing a solar day. Per pixel the first valid value
    /// in time order wins; each group keeps its earliest timestamp.
    pub fn group_by_solar_day(&self, longitude: Option<f64>) -> Cube {
        let offset = longitude
            .map(|lon| Duration::seconds((lon / 15.0 * 3600.0).round() as i64))
            .unwrap_or_else(Duration::zero);

        let mut order: Vec<usize> = (0..self.times.len()).collect();
        order.sort_by_key(|&i| self.times[i]);

        let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for i in order {
            days.entry((self.times[i] + offset).date_naive()).or_default().push(i);
        }

        let times: Vec<DateTime<Utc>> = days.values().map(|group| self.times[group[0]]).collect();
        log::debug!(
            "Solar-day grouping: {} acquisitions -> {} days",
            self.times.len(),
            times.len()
        );

        let (height, width) = self.geobox.shape();
        let mut measurements = IndexMap::new();

        for (name, m) in &self.measurements {
            let mut data = Array3::<Sample>::zeros((days.len(), height, width));
            for (g, group) in days.values().enumerate() {
                let mut out = data.index_axis_mut(Axis(0), g);
                for ((y, x), value) in out.indexed_iter_mut() {
                    *value = group
                        .iter()
                        .map(|&t| m.data[[t, y, x]])
                        .find(|v| m.is_valid(*v))
                        .unwrap_or(m.data[[group[0], y, x]]);
                }
            }
            measurements.insert(name.clone(), Measurement { data, nodata: m.nodata });
        }

        Cube {
            geobox: self.geobox.clone(),
            times,
            measurements,
        }
    }

    /// Replace each band's no-data sentinel with NaN
    pub fn to_float_nodata(&self) -> Cube {
        let mut converted = self.clone();
        for m in converted.measurements.values_mut() {
            if let Some(nodata) = m.nodata.take() {
                m.data.mapv_inplace(|v| if v == nodata { Sample::NAN } else { v });
            }
        }
        converted
    }
}

/// Time-invariant cropland raster used as a per-pixel validity filter
#[derive(Debug, Clone)]
pub struct CropMask {
    geobox: GeoBox,
    data: Layer,
    nodata: Option<Sample>,
}

impl CropMask {
    pub fn new(geobox: GeoBox, data: Layer, nodata: Option<Sample>) -> FeatureResult<Self> {
        if data.dim() != geobox.shape() {
            return Err(FeatureError::Shape(format!(
                "crop mask shape {:?} does not match its grid {:?}",
                data.dim(),
                geobox.shape()
            )));
        }
        Ok(Self { geobox, data, nodata })
    }

    /// Select `band` from a mask product load and squeeze its time axis
    pub fn from_cube(cube: &Cube, band: &str) -> FeatureResult<Self> {
        let nodata = cube.measurement(band)?.nodata;
        let data = cube.squeeze(band)?;
        Self::new(cube.geobox().clone(), data, nodata)
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    pub fn data(&self) -> &Layer {
        &self.data
    }

    /// A pixel is cropland when it is valid and non-zero
    pub fn is_crop(&self, value: Sample) -> bool {
        is_valid(value, self.nodata) && value != 0.0
    }

    pub fn cropland(&self) -> Array2<bool> {
        self.data.mapv(|v| self.is_crop(v))
    }
}
