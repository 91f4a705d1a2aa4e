use crate::config::{FeatureConfig, ProductConfig};
use crate::core::cube::{CropMask, Cube};
use crate::core::features::FeatureGrid;
use crate::core::indices::{BandIndexCalculator, IndexCalculator};
use crate::io::ard::{ArdLoader, ArdRequest, DatacubeArdLoader};
use crate::io::datacube::{Datacube, DatacubeConnector};
use crate::types::{FeatureResult, Query, TimeRange};

/// Builds the crop-masked, monthly feature layers for a query.
///
/// Each call opens its own data-cube session; the assembler itself holds no
/// mutable state.
pub struct FeatureAssembler<C, A = DatacubeArdLoader, I = BandIndexCalculator> {
    connector: C,
    ard: A,
    indices: I,
    config: FeatureConfig,
}

impl<C: DatacubeConnector> FeatureAssembler<C> {
    /// Assembler with the default loader, index formulas and configuration
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            ard: DatacubeArdLoader,
            indices: BandIndexCalculator::default(),
            config: FeatureConfig::default(),
        }
    }
}

impl<C, A, I> FeatureAssembler<C, A, I>
where
    C: DatacubeConnector,
    A: ArdLoader,
    I: IndexCalculator,
{
    pub fn with_components(connector: C, ard: A, indices: I, config: FeatureConfig) -> Self {
        Self {
            connector,
            ard,
            indices,
            config,
        }
    }

    pub fn with_config(mut self, config: FeatureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Load, mask, resample and flatten both satellite streams into one
    /// feature grid. Any load failure aborts the whole assembly.
    pub fn assemble_features(&self, query: &Query) -> FeatureResult<FeatureGrid> {
        log::info!("Assembling feature layers");
        log::debug!("Query: {:?}", query);

        let dc = self.connector.connect(&self.config.app_name)?;

        let crop_mask = self.load_crop_mask(&*dc, query)?;

        log::info!("Processing Sentinel-1 stream");
        let s1_monthly = self.load_monthly_means(&*dc, &self.config.sentinel1, &crop_mask, query)?;

        log::info!("Processing Sentinel-2 stream");
        let s2_monthly = self.load_monthly_means(&*dc, &self.config.sentinel2, &crop_mask, query)?;
        let s2_monthly = self
            .indices
            .calculate_indices(&s2_monthly, &self.config.indices, self.config.mission)?;
        let s2_monthly = self.add_ratio_band(s2_monthly)?;

        let grid = FeatureGrid::merge_all([
            FeatureGrid::flatten_time(&s1_monthly)?,
            FeatureGrid::flatten_time(&s2_monthly)?,
        ])?;

        log::info!(
            "Assembled {} feature layers ({} Sentinel-1 months, {} Sentinel-2 months)",
            grid.len(),
            s1_monthly.times().len(),
            s2_monthly.times().len()
        );
        Ok(grid)
    }

    /// The crop mask is always taken from its reference year, whatever the
    /// query's time range.
    fn load_crop_mask(&self, dc: &dyn Datacube, query: &Query) -> FeatureResult<CropMask> {
        let mask_config = &self.config.crop_mask;
        let mask_query = query.with_time(TimeRange::year(mask_config.year)?);

        log::info!(
            "Loading crop mask '{}' for {}",
            mask_config.product,
            mask_config.year
        );
        let mask_cube = dc.load(
            &mask_config.product,
            std::slice::from_ref(&mask_config.measurement),
            &mask_query,
        )?;
        CropMask::from_cube(&mask_cube, &mask_config.measurement)
    }

    fn load_monthly_means(
        &self,
        dc: &dyn Datacube,
        product: &ProductConfig,
        crop_mask: &CropMask,
        query: &Query,
    ) -> FeatureResult<Cube> {
        let request = ArdRequest {
            products: product.products.clone(),
            measurements: product.measurements.clone(),
            group_by: self.config.group_by,
            dtype: self.config.dtype,
            verbose: false,
        };

        let cube = self.ard.load_ard(dc, &request, query)?;
        log::debug!(
            "{:?}: {} acquisitions on a {}x{} grid",
            product.products,
            cube.times().len(),
            cube.geobox().width,
            cube.geobox().height
        );

        cube.apply_mask(crop_mask)?.resample_monthly_mean()
    }

    /// Pixelwise band ratio. Division by zero is left to IEEE semantics.
    fn add_ratio_band(&self, mut cube: Cube) -> FeatureResult<Cube> {
        let ratio = &self.config.ratio;
        let data = {
            let numerator = &cube.measurement(&ratio.numerator)?.data;
            let denominator = &cube.measurement(&ratio.denominator)?.data;
            numerator / denominator
        };
        cube.insert_measurement(ratio.name.clone(), data, None)?;
        Ok(cube)
    }
}

/// Assemble features with the default pipeline over `connector`
pub fn feature_layers<C: DatacubeConnector>(connector: C, query: &Query) -> FeatureResult<FeatureGrid> {
    FeatureAssembler::new(connector).assemble_features(query)
}
