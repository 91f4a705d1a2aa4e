//! Pipeline configuration: product identifiers, band lists and load options.
//!
//! `FeatureConfig::default()` is the standard crop-mapping feature set; a TOML
//! file only needs the keys it changes.

use crate::core::indices::{SatelliteMission, SpectralIndex};
use crate::io::ard::{DType, GroupBy};
use crate::types::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Crop-mask product, loaded for a fixed reference year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropMaskConfig {
    pub product: String,
    pub measurement: String,
    pub year: i32,
}

impl Default for CropMaskConfig {
    fn default() -> Self {
        Self {
            product: "crop_mask".to_string(),
            measurement: "mask".to_string(),
            year: 2019,
        }
    }
}

/// One satellite stream: products and the bands loaded from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub products: Vec<String>,
    pub measurements: Vec<String>,
}

impl ProductConfig {
    pub fn new(products: &[&str], measurements: &[&str]) -> Self {
        Self {
            products: products.iter().map(|s| s.to_string()).collect(),
            measurements: measurements.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn sentinel1() -> Self {
        Self::new(&["s1_rtc"], &["vv", "vh"])
    }

    pub fn sentinel2() -> Self {
        Self::new(
            &["s2_l2a"],
            &[
                "red",
                "green",
                "blue",
                "red_edge_1",
                "red_edge_2",
                "red_edge_3",
                "nir",
                "nir_narrow",
                "swir_1",
                "swir_2",
            ],
        )
    }
}

/// Plain band ratio added next to the spectral indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioConfig {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            name: "CI".to_string(),
            numerator: "red".to_string(),
            denominator: "nir".to_string(),
        }
    }
}

/// Full feature-assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Application name attached to each data-cube session
    pub app_name: String,
    pub crop_mask: CropMaskConfig,
    pub sentinel1: ProductConfig,
    pub sentinel2: ProductConfig,
    pub indices: Vec<SpectralIndex>,
    pub mission: SatelliteMission,
    pub ratio: RatioConfig,
    pub group_by: GroupBy,
    pub dtype: DType,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            app_name: "feature_layers".to_string(),
            crop_mask: CropMaskConfig::default(),
            sentinel1: ProductConfig::sentinel1(),
            sentinel2: ProductConfig::sentinel2(),
            indices: vec![
                SpectralIndex::EVI,
                SpectralIndex::SAVI,
                SpectralIndex::MSAVI,
                SpectralIndex::LAI,
                SpectralIndex::NDVI,
            ],
            mission: SatelliteMission::Sentinel2,
            ratio: RatioConfig::default(),
            group_by: GroupBy::SolarDay,
            dtype: DType::Native,
        }
    }
}

impl FeatureConfig {
    pub fn from_toml_str(content: &str) -> FeatureResult<Self> {
        let config: FeatureConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        log::info!("Reading feature configuration: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> FeatureResult<()> {
        for (stream, products) in [("sentinel1", &self.sentinel1), ("sentinel2", &self.sentinel2)] {
            if products.products.is_empty() {
                return Err(FeatureError::Config(format!("{} has no products", stream)));
            }
            if products.measurements.is_empty() {
                return Err(FeatureError::Config(format!("{} has no measurements", stream)));
            }
        }

        for band in [&self.ratio.numerator, &self.ratio.denominator] {
            if !self.sentinel2.measurements.contains(band) {
                return Err(FeatureError::Config(format!(
                    "ratio '{}' needs band '{}' in sentinel2 measurements",
                    self.ratio.name, band
                )));
            }
        }

        for index in &self.indices {
            for band in index.required_bands() {
                if !self.sentinel2.measurements.iter().any(|m| m.as_str() == *band) {
                    return Err(FeatureError::Config(format!(
                        "{} needs band '{}' in sentinel2 measurements",
                        index, band
                    )));
                }
            }
        }

        Ok(())
    }
}
