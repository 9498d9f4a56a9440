use crate::{MarkerProcessor, MarkerSize, MarkerType, ZolotoError};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};
use zoloto_aruco::DetectorParams;
use zoloto_core::parse_calibration_file;

/// JSON-serialisable description of a marker pipeline.
///
/// ```json
/// {
///   "marker_type": "DICT_4X4_50",
///   "marker_size": { "sizes": { "0": 80 }, "default": 200 },
///   "calibration_file": "calibration.json",
///   "detector": { "adaptive_thresh_constant": 7.0 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub marker_type: MarkerType,
    pub marker_size: MarkerSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,
    pub detector: DetectorParams,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            marker_type: MarkerType::Dict4x4_50,
            marker_size: MarkerSize::Fixed(100),
            calibration_file: None,
            detector: DetectorParams::default(),
        }
    }
}

impl CameraConfig {
    /// Read a config file. A relative `calibration_file` is resolved against
    /// the config's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZolotoError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut config: Self = serde_json::from_reader(reader)?;
        if let (Some(calib), Some(dir)) = (config.calibration_file.as_mut(), path.parent()) {
            if calib.is_relative() {
                *calib = dir.join(&*calib);
            }
        }
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ZolotoError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Build the processor, reading the calibration file if one is set.
    pub fn build_processor(&self) -> Result<MarkerProcessor, ZolotoError> {
        let calibration = self
            .calibration_file
            .as_ref()
            .map(parse_calibration_file)
            .transpose()?;
        Ok(MarkerProcessor::with_params(
            self.marker_type,
            self.marker_size.clone(),
            calibration,
            self.detector.clone(),
        ))
    }
}
