use crate::core::cube::Cube;
use crate::types::{FeatureError, FeatureResult, Query};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Query/load service of a satellite data cube
pub trait Datacube {
    /// Load `measurements` of `product` over the query's extent and time range.
    ///
    /// Fails with `InvalidQuery` when the query has no usable extent and with
    /// `DataUnavailable` when nothing matches.
    fn load(&self, product: &str, measurements: &[String], query: &Query) -> FeatureResult<Cube>;
}

/// Opens data-cube sessions
pub trait DatacubeConnector {
    /// Open a new session tagged with `app`
    fn connect(&self, app: &str) -> FeatureResult<Box<dyn Datacube + '_>>;
}

/// Product registry held in memory, one cube per product
#[derive(Debug, Default)]
pub struct InMemoryDatacube {
    products: IndexMap<String, Cube>,
    sessions: AtomicUsize,
}

impl InMemoryDatacube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the full holdings of a product
    pub fn add_product(&mut self, name: impl Into<String>, cube: Cube) {
        let name = name.into();
        log::debug!(
            "Registering product '{}' with {} time steps",
            name,
            cube.times().len()
        );
        self.products.insert(name, cube);
    }

    /// Number of sessions opened through `connect`
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Datacube for InMemoryDatacube {
    fn load(&self, product: &str, measurements: &[String], query: &Query) -> FeatureResult<Cube> {
        let bbox = query.bounding_box()?;

        let holdings = self
            .products
            .get(product)
            .ok_or_else(|| FeatureError::DataUnavailable(format!("unknown product '{}'", product)))?;

        let same_crs = match query.crs.as_deref() {
            None => true,
            Some(crs) => crs.eq_ignore_ascii_case(&holdings.geobox().crs),
        };
        if same_crs && !holdings.geobox().bounds().intersects(&bbox) {
            return Err(FeatureError::DataUnavailable(format!(
                "product '{}' does not intersect the query extent",
                product
            )));
        }

        let selected = holdings.select_measurements(measurements)?;
        let loaded = match &query.time {
            Some(range) => selected.select_time(range),
            None => selected,
        };

        if loaded.times().is_empty() {
            return Err(FeatureError::DataUnavailable(format!(
                "no '{}' data in the query time range",
                product
            )));
        }

        log::debug!(
            "Loaded {} time steps of {:?} from '{}'",
            loaded.times().len(),
            measurements,
            product
        );
        Ok(loaded)
    }
}

impl DatacubeConnector for InMemoryDatacube {
    fn connect(&self, app: &str) -> FeatureResult<Box<dyn Datacube + '_>> {
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Opened in-memory datacube session {} for '{}'", session, app);
        Ok(Box::new(self))
    }
}

impl<T: Datacube + ?Sized> Datacube for &T {
    fn load(&self, product: &str, measurements: &[String], query: &Query) -> FeatureResult<Cube> {
        (**self).load(product, measurements, query)
    }
}

impl<T: DatacubeConnector + ?Sized> DatacubeConnector for &T {
    fn connect(&self, app: &str) -> FeatureResult<Box<dyn Datacube + '_>> {
        (**self).connect(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoBox, GeoTransform, TimeRange};
    use chrono::{TimeZone, Utc};
    use ndarray::Array3;

    fn datacube() -> InMemoryDatacube {
        let geobox = GeoBox::new(2, 2, GeoTransform::north_up(30.0, 0.0, 0.1, -0.1), "EPSG:4326");
        let times = vec![
            Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        ];
        let mut cube = Cube::new(geobox, times);
        cube.insert_measurement("mask", Array3::from_elem((2, 2, 2), 1.0), None).unwrap();

        let mut dc = InMemoryDatacube::new();
        dc.add_product("crop_mask", cube);
        dc
    }

    fn query() -> Query {
        Query {
            x: Some((30.0, 30.2)),
            y: Some((-0.2, 0.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_filters_time() {
        let dc = datacube();
        let query = query().with_time(TimeRange::year(2019).unwrap());
        let cube = dc.load("crop_mask", &["mask".to_string()], &query).unwrap();
        assert_eq!(cube.times().len(), 1);
    }

    #[test]
    fn test_unknown_product_is_unavailable() {
        let dc = datacube();
        let result = dc.load("s2_l2a", &["red".to_string()], &query());
        assert!(matches!(result, Err(FeatureError::DataUnavailable(_))));
    }

    #[test]
    fn test_disjoint_extent_is_unavailable() {
        let dc = datacube();
        let query = Query {
            x: Some((10.0, 10.1)),
            y: Some((5.0, 5.1)),
            ..Default::default()
        };
        let result = dc.load("crop_mask", &["mask".to_string()], &query);
        assert!(matches!(result, Err(FeatureError::DataUnavailable(_))));
    }

    #[test]
    fn test_missing_extent_is_invalid() {
        let dc = datacube();
        let result = dc.load("crop_mask", &["mask".to_string()], &Query::default());
        assert!(matches!(result, Err(FeatureError::InvalidQuery(_))));
    }

    #[test]
    fn test_connect_counts_sessions() {
        let dc = datacube();
        dc.connect("feature_layers").unwrap();
        dc.connect("feature_layers").unwrap();
        assert_eq!(dc.sessions_opened(), 2);
    }
}
