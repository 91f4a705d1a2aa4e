use crate::core::cube::Cube;
use crate::types::{FeatureError, FeatureResult, Sample};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

/// Spectral indices available to the feature pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralIndex {
    /// Enhanced Vegetation Index
    EVI,
    /// Soil Adjusted Vegetation Index
    SAVI,
    /// Modified Soil Adjusted Vegetation Index
    MSAVI,
    /// Leaf Area Index (from EVI)
    LAI,
    /// Normalised Difference Vegetation Index
    NDVI,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::EVI => "EVI",
            SpectralIndex::SAVI => "SAVI",
            SpectralIndex::MSAVI => "MSAVI",
            SpectralIndex::LAI => "LAI",
            SpectralIndex::NDVI => "NDVI",
        }
    }

    /// Bands the formula reads
    pub fn required_bands(&self) -> &'static [&'static str] {
        match self {
            SpectralIndex::EVI | SpectralIndex::LAI => &["nir", "red", "blue"],
            SpectralIndex::SAVI | SpectralIndex::MSAVI | SpectralIndex::NDVI => &["nir", "red"],
        }
    }

    /// Evaluate the index for one pixel of surface reflectance (0..1)
    pub fn evaluate(&self, nir: Sample, red: Sample, blue: Sample) -> Sample {
        match self {
            SpectralIndex::NDVI => (nir - red) / (nir + red),
            SpectralIndex::EVI => evi(nir, red, blue),
            SpectralIndex::LAI => 3.618 * evi(nir, red, blue) - 0.118,
            SpectralIndex::SAVI => 1.5 * (nir - red) / (nir + red + 0.5),
            SpectralIndex::MSAVI => {
                let a = 2.0 * nir + 1.0;
                (a - (a * a - 8.0 * (nir - red)).sqrt()) / 2.0
            }
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn evi(nir: Sample, red: Sample, blue: Sample) -> Sample {
    2.5 * (nir - red) / (nir + 6.0 * red - 7.5 * blue + 1.0)
}

/// Sensor whose reflectance scaling the index formulas assume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatelliteMission {
    #[serde(rename = "s2")]
    Sentinel2,
    #[serde(rename = "ls")]
    Landsat,
}

impl SatelliteMission {
    /// Divisor turning stored integer reflectance into 0..1 reflectance
    pub fn reflectance_scale(&self) -> Sample {
        match self {
            SatelliteMission::Sentinel2 => 10_000.0,
            SatelliteMission::Landsat => 1.0,
        }
    }
}

/// Band-index calculator collaborator
pub trait IndexCalculator {
    /// Return a copy of `cube` with one band per requested index appended
    fn calculate_indices(
        &self,
        cube: &Cube,
        indices: &[SpectralIndex],
        mission: SatelliteMission,
    ) -> FeatureResult<Cube>;
}

/// Published index formulas over normalised surface reflectance
#[derive(Debug, Clone)]
pub struct BandIndexCalculator {
    /// Rescale stored reflectance to 0..1 before applying formulas
    pub normalise: bool,
}

impl Default for BandIndexCalculator {
    fn default() -> Self {
        Self { normalise: true }
    }
}

impl BandIndexCalculator {
    pub fn new(normalise: bool) -> Self {
        Self { normalise }
    }
}

impl IndexCalculator for BandIndexCalculator {
    fn calculate_indices(
        &self,
        cube: &Cube,
        indices: &[SpectralIndex],
        mission: SatelliteMission,
    ) -> FeatureResult<Cube> {
        log::info!("Calculating {} band indices for {:?}", indices.len(), mission);

        for index in indices {
            for band in index.required_bands() {
                if cube.measurement(band).is_err() {
                    return Err(FeatureError::MissingMeasurement(format!(
                        "{} requires band '{}'",
                        index, band
                    )));
                }
            }
        }

        let scale = if self.normalise { mission.reflectance_scale() } else { 1.0 };
        let mut result = cube.clone();

        for index in indices {
            let nir = &cube.measurement("nir")?.data;
            let red = &cube.measurement("red")?.data;
            // NDVI, SAVI and MSAVI ignore blue; fall back to red when it is absent
            let blue = match cube.measurement("blue") {
                Ok(m) => &m.data,
                Err(_) => red,
            };

            let mut out = Array3::<Sample>::zeros(nir.dim());
            Zip::from(&mut out)
                .and(nir)
                .and(red)
                .and(blue)
                .for_each(|o, &n, &r, &b| {
                    *o = index.evaluate(n / scale, r / scale, b / scale);
                });

            log::debug!("Computed {}", index);
            result.insert_measurement(index.name(), out, None)?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoBox, GeoTransform};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn reflectance_cube(nir: f32, red: f32, blue: f32) -> Cube {
        let geobox = GeoBox::new(1, 1, GeoTransform::north_up(0.0, 0.0, 10.0, -10.0), "EPSG:6933");
        let mut cube = Cube::new(geobox, vec![Utc.with_ymd_and_hms(2021, 1, 31, 0, 0, 0).unwrap()]);
        cube.insert_measurement("red", Array3::from_elem((1, 1, 1), red), None).unwrap();
        cube.insert_measurement("blue", Array3::from_elem((1, 1, 1), blue), None).unwrap();
        cube.insert_measurement("nir", Array3::from_elem((1, 1, 1), nir), None).unwrap();
        cube
    }

    #[test]
    fn test_ndvi_matches_formula() {
        let cube = reflectance_cube(4000.0, 1000.0, 500.0);
        let result = BandIndexCalculator::default()
            .calculate_indices(&cube, &[SpectralIndex::NDVI], SatelliteMission::Sentinel2)
            .unwrap();

        let ndvi = result.measurement("NDVI").unwrap().data[[0, 0, 0]];
        assert_relative_eq!(ndvi, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_evi_and_lai_use_normalised_reflectance() {
        let cube = reflectance_cube(4000.0, 1000.0, 500.0);
        let result = BandIndexCalculator::default()
            .calculate_indices(
                &cube,
                &[SpectralIndex::EVI, SpectralIndex::LAI],
                SatelliteMission::Sentinel2,
            )
            .unwrap();

        // 2.5 * 0.3 / (0.4 + 0.6 - 0.375 + 1)
        let expected_evi = 0.75 / 1.625;
        let evi = result.measurement("EVI").unwrap().data[[0, 0, 0]];
        let lai = result.measurement("LAI").unwrap().data[[0, 0, 0]];
        assert_relative_eq!(evi, expected_evi, epsilon = 1e-6);
        assert_relative_eq!(lai, 3.618 * expected_evi - 0.118, epsilon = 1e-5);
    }

    #[test]
    fn test_savi_and_msavi() {
        let savi = SpectralIndex::SAVI.evaluate(0.4, 0.1, 0.0);
        assert_relative_eq!(savi, 1.5 * 0.3 / 1.0, epsilon = 1e-6);

        let msavi = SpectralIndex::MSAVI.evaluate(0.4, 0.1, 0.0);
        let expected = (1.8 - (1.8f32 * 1.8 - 2.4).sqrt()) / 2.0;
        assert_relative_eq!(msavi, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_input_bands_are_kept() {
        let cube = reflectance_cube(4000.0, 1000.0, 500.0);
        let result = BandIndexCalculator::default()
            .calculate_indices(&cube, &[SpectralIndex::SAVI], SatelliteMission::Sentinel2)
            .unwrap();

        let names: Vec<&str> = result.band_names().collect();
        assert_eq!(names, vec!["red", "blue", "nir", "SAVI"]);
    }

    #[test]
    fn test_missing_blue_band_is_reported() {
        let cube = reflectance_cube(4000.0, 1000.0, 500.0)
            .select_measurements(&["red", "nir"])
            .unwrap();
        let result = BandIndexCalculator::default().calculate_indices(
            &cube,
            &[SpectralIndex::EVI],
            SatelliteMission::Sentinel2,
        );
        assert!(matches!(result, Err(FeatureError::MissingMeasurement(_))));
    }

    #[test]
    fn test_nan_pixels_stay_nan() {
        let cube = reflectance_cube(f32::NAN, f32::NAN, f32::NAN);
        let result = BandIndexCalculator::default()
            .calculate_indices(&cube, &[SpectralIndex::NDVI], SatelliteMission::Sentinel2)
            .unwrap();
        assert!(result.measurement("NDVI").unwrap().data[[0, 0, 0]].is_nan());
    }
}
