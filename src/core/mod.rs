//! Core feature-assembly modules

pub mod assembler;
pub mod cube;
pub mod features;
pub mod indices;

// Re-export main types
pub use assembler::{feature_layers, FeatureAssembler};
pub use cube::{CropMask, Cube, Measurement};
pub use features::{layer_name, FeatureGrid};
pub use indices::{BandIndexCalculator, IndexCalculator, SatelliteMission, SpectralIndex};
