//! Data-cube access and raster output

pub mod ard;
pub mod datacube;
pub mod geotiff;

pub use ard::{ArdLoader, ArdRequest, DType, DatacubeArdLoader, GroupBy};
pub use datacube::{Datacube, DatacubeConnector, InMemoryDatacube};
pub use geotiff::{read_feature_grid, GeoTiffWriter};
