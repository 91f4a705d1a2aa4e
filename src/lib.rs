//! Crop feature layers from Sentinel-1 and Sentinel-2
//!
//! Loads a crop mask and two satellite streams from a data cube, masks them to
//! cropland, resamples to monthly means, adds vegetation indices and flattens
//! everything into one grid of `{band}_{YYYY-MM-DD}` layers for a crop-type
//! classifier.

pub mod config;
pub mod core;
pub mod io;
pub mod types;
pub mod utils;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, FeatureError, FeatureResult, GeoBox, GeoTransform, Layer, Query, Sample, TimeRange,
};

pub use config::FeatureConfig;
pub use crate::core::{feature_layers, CropMask, Cube, FeatureAssembler, FeatureGrid};
pub use io::{Datacube, DatacubeConnector, GeoTiffWriter, InMemoryDatacube};
pub use utils::find_key;
