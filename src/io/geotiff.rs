use crate::core::features::FeatureGrid;
use crate::types::{FeatureError, FeatureResult, GeoBox, GeoTransform};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

/// Writes feature grids as multi-band float32 GeoTIFFs, one band per layer
#[derive(Debug, Clone, Default)]
pub struct GeoTiffWriter {
    compression: Option<String>,
}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// GTiff COMPRESS creation option, e.g. "DEFLATE" or "LZW"
    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    pub fn write<P: AsRef<Path>>(&self, grid: &FeatureGrid, output_path: P) -> FeatureResult<()> {
        log::info!(
            "Saving {} feature layers as GeoTIFF: {}",
            grid.len(),
            output_path.as_ref().display()
        );

        if grid.is_empty() {
            return Err(FeatureError::Shape("feature grid has no layers".to_string()));
        }

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = grid.geobox().shape();

        let mut options = vec![RasterCreationOption {
            key: "INTERLEAVE",
            value: "BAND",
        }];
        if let Some(compression) = &self.compression {
            options.push(RasterCreationOption {
                key: "COMPRESS",
                value: compression,
            });
        }

        let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
            output_path.as_ref(),
            width as isize,
            height as isize,
            grid.len() as isize,
            &options,
        )?;

        dataset.set_geo_transform(&grid.geobox().transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_definition(&grid.geobox().crs)?)?;

        for (i, (name, layer)) in grid.layers().enumerate() {
            let mut rasterband = dataset.rasterband(i as isize + 1)?;
            let flat_data: Vec<f32> = layer.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(Some(f64::NAN))?;
            rasterband.set_description(name)?;
        }

        log::info!("GeoTIFF saved");
        Ok(())
    }
}

/// Read a GeoTIFF written by `GeoTiffWriter` back into a feature grid,
/// naming layers by band description
pub fn read_feature_grid<P: AsRef<Path>>(path: P) -> FeatureResult<FeatureGrid> {
    log::info!("Reading feature layers from: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let (width, height) = dataset.raster_size();
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);

    let srs = dataset.spatial_ref()?;
    let crs = match (srs.auth_name(), srs.auth_code()) {
        (Ok(name), Ok(code)) => format!("{}:{}", name, code),
        _ => srs.to_wkt()?,
    };

    let mut grid = FeatureGrid::new(GeoBox::new(width, height, transform, crs));
    for index in 1..=dataset.raster_count() {
        let rasterband = dataset.rasterband(index)?;
        let name = match rasterband.description() {
            Ok(description) if !description.is_empty() => description,
            _ => format!("band_{}", index),
        };
        let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let layer = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| FeatureError::Shape(format!("Failed to reshape band {}: {}", index, e)))?;
        grid.insert_layer(name, layer)?;
    }

    log::debug!("Read {} layers of {}x{}", grid.len(), width, height);
    Ok(grid)
}
