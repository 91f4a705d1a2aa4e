use crate::core::cube::Cube;
use crate::types::{FeatureError, FeatureResult, GeoBox, Layer};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Axis;

/// Layer name for one band at one time step: `{band}_{YYYY-MM-DD}`.
///
/// The date is the first 10 characters of the ISO-8601 timestamp, so any
/// time-of-day is dropped.
pub fn layer_name(band: &str, time: &DateTime<Utc>) -> String {
    let iso = time.to_rfc3339();
    let date = iso.get(..10).unwrap_or(&iso);
    format!("{}_{}", band, date)
}

/// Named 2D feature layers on a shared grid, without a time axis
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    geobox: GeoBox,
    layers: IndexMap<String, Layer>,
}

impl FeatureGrid {
    pub fn new(geobox: GeoBox) -> Self {
        Self {
            geobox,
            layers: IndexMap::new(),
        }
    }

    /// One layer per (band, time step) of `cube`, bands outermost
    pub fn flatten_time(cube: &Cube) -> FeatureResult<Self> {
        let mut grid = FeatureGrid::new(cube.geobox().clone());

        for (band, m) in cube.measurements() {
            for (t, time) in cube.times().iter().enumerate() {
                let slice = m.data.index_axis(Axis(0), t).to_owned();
                grid.insert_layer(layer_name(band, time), slice)?;
            }
        }

        log::debug!(
            "Flattened {} bands x {} time steps into {} layers",
            cube.band_names().count(),
            cube.times().len(),
            grid.len()
        );
        Ok(grid)
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    /// Insert a layer. An existing layer of the same name is replaced in
    /// place and returned.
    pub fn insert_layer(&mut self, name: impl Into<String>, layer: Layer) -> FeatureResult<Option<Layer>> {
        let name = name.into();
        if layer.dim() != self.geobox.shape() {
            return Err(FeatureError::Shape(format!(
                "layer '{}' has shape {:?}, grid expects {:?}",
                name,
                layer.dim(),
                self.geobox.shape()
            )));
        }

        let previous = self.layers.insert(name.clone(), layer);
        if previous.is_some() {
            log::warn!("Layer '{}' overridden during merge", name);
        }
        Ok(previous)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &Layer)> {
        self.layers.iter().map(|(name, layer)| (name.as_str(), layer))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Merge `other` into this grid; on a name clash `other` wins
    pub fn merge(&mut self, other: FeatureGrid) -> FeatureResult<()> {
        if other.geobox != self.geobox {
            return Err(FeatureError::Shape(
                "cannot merge feature grids on different pixel grids".to_string(),
            ));
        }
        for (name, layer) in other.layers {
            self.insert_layer(name, layer)?;
        }
        Ok(())
    }

    /// Merge a sequence of grids in order; later layers override earlier ones
    pub fn merge_all(grids: impl IntoIterator<Item = FeatureGrid>) -> FeatureResult<FeatureGrid> {
        let mut grids = grids.into_iter();
        let mut merged = grids
            .next()
            .ok_or_else(|| FeatureError::DataUnavailable("no feature layers to merge".to_string()))?;
        for grid in grids {
            merged.merge(grid)?;
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::TimeZone;
    use ndarray::{Array2, Array3};

    fn geobox() -> GeoBox {
        GeoBox::new(2, 2, GeoTransform::north_up(0.0, 0.0, 10.0, -10.0), "EPSG:6933")
    }

    #[test]
    fn test_layer_name_truncates_to_date() {
        let time = Utc.with_ymd_and_hms(2021, 3, 31, 14, 5, 0).unwrap();
        assert_eq!(layer_name("vv", &time), "vv_2021-03-31");
        assert_eq!(layer_name("red_edge_1", &time), "red_edge_1_2021-03-31");
    }

    #[test]
    fn test_flatten_orders_band_then_time() {
        let times = vec![
            Utc.with_ymd_and_hms(2021, 1, 31, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 2, 28, 0, 0, 0).unwrap(),
        ];
        let mut cube = Cube::new(geobox(), times);
        cube.insert_measurement("vv", Array3::from_elem((2, 2, 2), 1.0), None).unwrap();
        cube.insert_measurement("vh", Array3::from_elem((2, 2, 2), 2.0), None).unwrap();

        let grid = FeatureGrid::flatten_time(&cube).unwrap();
        let names: Vec<&str> = grid.layer_names().collect();
        assert_eq!(
            names,
            vec!["vv_2021-01-31", "vv_2021-02-28", "vh_2021-01-31", "vh_2021-02-28"]
        );
        assert_eq!(grid.layer("vh_2021-02-28").unwrap()[[1, 1]], 2.0);
    }

    #[test]
    fn test_merge_keeps_distinct_dates() {
        let mut a = FeatureGrid::new(geobox());
        a.insert_layer("red_2021-01-31", Array2::zeros((2, 2))).unwrap();
        let mut b = FeatureGrid::new(geobox());
        b.insert_layer("red_2021-02-28", Array2::ones((2, 2))).unwrap();

        let merged = FeatureGrid::merge_all(vec![a, b]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_rejects_other_grid() {
        let mut a = FeatureGrid::new(geobox());
        let shifted = GeoBox::new(2, 2, GeoTransform::north_up(100.0, 0.0, 10.0, -10.0), "EPSG:6933");
        let mut b = FeatureGrid::new(shifted);
        b.insert_layer("red_2021-01-31", Array2::ones((2, 2))).unwrap();

        assert!(matches!(a.merge(b), Err(FeatureError::Shape(_))));
    }

    #[test]
    fn test_merge_clash_keeps_later_layer() {
        let mut a = FeatureGrid::new(geobox());
        a.insert_layer("red_2021-01-31", Array2::zeros((2, 2))).unwrap();
        a.insert_layer("nir_2021-01-31", Array2::zeros((2, 2))).unwrap();
        let mut b = FeatureGrid::new(geobox());
        b.insert_layer("red_2021-01-31", Array2::from_elem((2, 2), 7.0)).unwrap();

        let merged = FeatureGrid::merge_all(vec![a, b]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.layer("red_2021-01-31").unwrap()[[0, 0]], 7.0);
        assert_eq!(merged.layer_names().next(), Some("red_2021-01-31"));
    }

    #[test]
    fn test_insert_rejects_wrong_shape() {
        let mut grid = FeatureGrid::new(geobox());
        let result = grid.insert_layer("vv_2021-01-31", Array2::zeros((3, 2)));
        assert!(matches!(result, Err(FeatureError::Shape(_))));
    }
}
