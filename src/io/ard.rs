use crate::core::cube::Cube;
use crate::io::datacube::Datacube;
use crate::types::{FeatureResult, Query};
use serde::{Deserialize, Serialize};

/// How acquisitions are grouped along time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One sample per acquisition
    Time,
    /// Same-day passes merged into one sample
    SolarDay,
}

/// Output sample type policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// Keep stored values; missing pixels hold the product's no-data value
    Native,
    /// Missing pixels become NaN
    Float32,
}

/// Parameters of one analysis-ready-data load
#[derive(Debug, Clone, PartialEq)]
pub struct ArdRequest {
    pub products: Vec<String>,
    pub measurements: Vec<String>,
    pub group_by: GroupBy,
    pub dtype: DType,
    pub verbose: bool,
}

/// Satellite-data loader returning analysis-ready cubes
pub trait ArdLoader {
    fn load_ard(&self, dc: &dyn Datacube, request: &ArdRequest, query: &Query) -> FeatureResult<Cube>;
}

/// Loads each product through the data cube, stacks them in time, then
/// applies grouping and dtype policy. Cloud and pixel-quality masking are
/// left to the data cube's products.
#[derive(Debug, Clone, Default)]
pub struct DatacubeArdLoader;

impl ArdLoader for DatacubeArdLoader {
    fn load_ard(&self, dc: &dyn Datacube, request: &ArdRequest, query: &Query) -> FeatureResult<Cube> {
        let announce = |msg: String| {
            if request.verbose {
                log::info!("{}", msg);
            } else {
                log::debug!("{}", msg);
            }
        };

        let mut cubes = Vec::with_capacity(request.products.len());
        for product in &request.products {
            announce(format!("Loading {} data", product));
            cubes.push(dc.load(product, &request.measurements, query)?);
        }

        let mut cube = Cube::concat_time(cubes)?;
        announce(format!("Loaded {} time steps", cube.times().len()));

        if request.group_by == GroupBy::SolarDay {
            cube = cube.group_by_solar_day(query.center_longitude());
            announce(format!("Grouped into {} solar days", cube.times().len()));
        }

        if request.dtype == DType::Float32 {
            cube = cube.to_float_nodata();
        }

        Ok(cube)
    }
}
