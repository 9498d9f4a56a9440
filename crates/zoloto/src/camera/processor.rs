use crate::{EagerMarker, Marker, MarkerObservation, MarkerType, ZolotoError};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use zoloto_aruco::{ArucoDetector, DetectorParams, MarkerDetection};
use zoloto_core::{estimate_marker_poses, CalibrationParameters};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Physical marker side length per id.
///
/// In JSON this is either a bare number or `{"sizes": {"<id>": n}, "default": n}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MarkerSizeRepr", into = "MarkerSizeRepr")]
pub enum MarkerSize {
    Fixed(u32),
    PerId {
        sizes: HashMap<u32, u32>,
        default: Option<u32>,
    },
}

// Untagged content buffers map keys as strings, so ids are parsed by hand.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MarkerSizeRepr {
    Fixed(u32),
    PerId {
        sizes: HashMap<String, u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<u32>,
    },
}

impl TryFrom<MarkerSizeRepr> for MarkerSize {
    type Error = String;

    fn try_from(repr: MarkerSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            MarkerSizeRepr::Fixed(size) => Ok(MarkerSize::Fixed(size)),
            MarkerSizeRepr::PerId { sizes, default } => {
                let sizes = sizes
                    .into_iter()
                    .map(|(k, v)| {
                        k.trim()
                            .parse::<u32>()
                            .map(|id| (id, v))
                            .map_err(|_| format!("marker id {k:?} is not an integer"))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(MarkerSize::PerId { sizes, default })
            }
        }
    }
}

impl From<MarkerSize> for MarkerSizeRepr {
    fn from(size: MarkerSize) -> Self {
        match size {
            MarkerSize::Fixed(size) => MarkerSizeRepr::Fixed(size),
            MarkerSize::PerId { sizes, default } => MarkerSizeRepr::PerId {
                sizes: sizes.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                default,
            },
        }
    }
}

impl MarkerSize {
    /// Size for `marker_id`; `None` means the marker is ignored.
    pub fn get_marker_size(&self, marker_id: u32) -> Option<u32> {
        match self {
            MarkerSize::Fixed(size) => Some(*size),
            MarkerSize::PerId { sizes, default } => sizes.get(&marker_id).copied().or(*default),
        }
    }
}

/// Detection plus marker construction, shared by all camera kinds.
#[derive(Clone, Debug)]
pub struct MarkerProcessor {
    detector: ArucoDetector,
    marker_type: MarkerType,
    marker_size: MarkerSize,
    calibration: Option<Arc<CalibrationParameters>>,
}

impl MarkerProcessor {
    pub fn new(
        marker_type: MarkerType,
        marker_size: MarkerSize,
        calibration: Option<CalibrationParameters>,
    ) -> Self {
        Self::with_params(marker_type, marker_size, calibration, DetectorParams::default())
    }

    pub fn with_params(
        marker_type: MarkerType,
        marker_size: MarkerSize,
        calibration: Option<CalibrationParameters>,
        params: DetectorParams,
    ) -> Self {
        Self {
            detector: ArucoDetector::new(marker_type.dictionary(), params),
            marker_type,
            marker_size,
            calibration: calibration.map(Arc::new),
        }
    }

    pub fn marker_type(&self) -> MarkerType {
        self.marker_type
    }

    pub fn marker_size(&self) -> &MarkerSize {
        &self.marker_size
    }

    pub fn calibration(&self) -> Option<&CalibrationParameters> {
        self.calibration.as_deref()
    }

    pub fn get_marker_size(&self, marker_id: u32) -> Option<u32> {
        self.marker_size.get_marker_size(marker_id)
    }

    /// Raw detections, skipping nothing.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(w = frame.width(), h = frame.height()))
    )]
    pub fn detect(&self, frame: &RgbImage) -> Vec<MarkerDetection> {
        let gray = image::imageops::grayscale(frame);
        self.detector.detect(&crate::gray_view(&gray))
    }

    /// Lazily-posed markers for every detection with a known size.
    pub fn markers(&self, frame: &RgbImage) -> Vec<Marker> {
        self.sized_observations(frame)
            .into_iter()
            .map(|obs| Marker::new(obs, self.calibration.clone()))
            .collect()
    }

    /// Markers with poses computed up front.
    ///
    /// Fails with [`ZolotoError::MissingCalibrations`] without calibration.
    /// Markers whose pose cannot be solved are dropped with a warning.
    pub fn eager_markers(&self, frame: &RgbImage) -> Result<Vec<EagerMarker>, ZolotoError> {
        let calibration = self
            .calibration
            .as_deref()
            .ok_or(ZolotoError::MissingCalibrations)?;
        let observations = self.sized_observations(frame);
        let inputs: Vec<_> = observations
            .iter()
            .map(|obs| (obs.corner_points(), obs.size() as f64))
            .collect();
        let poses = estimate_marker_poses(&inputs, calibration);

        let mut out = Vec::with_capacity(observations.len());
        for (obs, pose) in observations.into_iter().zip(poses) {
            match pose {
                Ok(vectors) => out.push(EagerMarker::new(obs, vectors)),
                Err(e) => log::warn!("marker {}: pose failed: {e}", obs.id()),
            }
        }
        Ok(out)
    }

    /// Ids of all detected markers, sized or not.
    pub fn visible_marker_ids(&self, frame: &RgbImage) -> Vec<u32> {
        self.detect(frame).into_iter().map(|d| d.id).collect()
    }

    fn sized_observations(&self, frame: &RgbImage) -> Vec<MarkerObservation> {
        self.detect(frame)
            .iter()
            .filter_map(|d| match self.get_marker_size(d.id) {
                Some(size) => Some(MarkerObservation::from_detection(d, size)),
                None => {
                    log::debug!("marker {} has no configured size; skipped", d.id);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_id_sizes_fall_back_to_default() {
        let sizes = MarkerSize::PerId {
            sizes: HashMap::from([(3, 50), (4, 75)]),
            default: None,
        };
        assert_eq!(sizes.get_marker_size(3), Some(50));
        assert_eq!(sizes.get_marker_size(9), None);

        let with_default: MarkerSize =
            serde_json::from_str(r#"{"sizes": {"3": 50}, "default": 100}"#).expect("parse");
        assert_eq!(with_default.get_marker_size(3), Some(50));
        assert_eq!(with_default.get_marker_size(9), Some(100));

        let fixed: MarkerSize = serde_json::from_str("120").expect("parse");
        assert_eq!(fixed, MarkerSize::Fixed(120));
        assert!(serde_json::from_str::<MarkerSize>(r#"{"sizes": {"x": 1}}"#).is_err());

        let json = serde_json::to_string(&with_default).expect("serialize");
        let back: MarkerSize = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, with_default);
    }

    #[test]
    fn eager_requires_calibration() {
        let processor = MarkerProcessor::new(MarkerType::Dict4x4_50, MarkerSize::Fixed(100), None);
        let frame = RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
        assert!(matches!(
            processor.eager_markers(&frame),
            Err(ZolotoError::MissingCalibrations)
        ));
        assert!(processor.markers(&frame).is_empty());
    }
}
