//! Detected markers and their (lazily computed) poses.

use crate::ZolotoError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::sync::Arc;
use zoloto_aruco::MarkerDetection;
use zoloto_core::{
    estimate_marker_pose, CalibrationParameters, Coordinates, Orientation, PoseVectors, Spherical,
    ThreeDCoordinates,
};

/// Identity, physical size and pixel corners of one detected marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerObservation {
    id: u32,
    size: u32,
    pixel_corners: [Coordinates; 4],
    pixel_centre: Coordinates,
}

impl MarkerObservation {
    /// `size` is the marker side length in the units `tvec` should use.
    pub fn new(id: u32, size: u32, pixel_corners: [Coordinates; 4]) -> Self {
        let (sx, sy) = pixel_corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
        Self {
            id,
            size,
            pixel_corners,
            pixel_centre: Coordinates::new(sx / 4.0, sy / 4.0),
        }
    }

    pub fn from_detection(detection: &MarkerDetection, size: u32) -> Self {
        let corners = detection
            .corners
            .map(|[x, y]| Coordinates::new(x as f64, y as f64));
        Self::new(detection.id, size, corners)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pixel_corners(&self) -> [Coordinates; 4] {
        self.pixel_corners
    }

    /// Centroid (mean) of the four pixel corners.
    pub fn pixel_centre(&self) -> Coordinates {
        self.pixel_centre
    }

    pub(crate) fn corner_points(&self) -> [Point2<f64>; 4] {
        self.pixel_corners.map(|c| Point2::new(c.x, c.y))
    }
}

/// Pose vectors plus everything derived from them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComputedPose {
    pub vectors: PoseVectors,
    pub distance: u32,
    pub orientation: Orientation,
    pub spherical: Spherical,
}

impl ComputedPose {
    pub fn new(vectors: PoseVectors) -> Self {
        // Truncation towards zero, matching an integer cast of the norm.
        let distance = vectors.translation().norm() as u32;
        Self {
            vectors,
            distance,
            orientation: Orientation::from_rvec(vectors.rvec),
            spherical: Spherical::from_tvec(vectors.tvec, distance),
        }
    }
}

/// Serializable summary of a marker; pose vectors are omitted when no
/// calibration is available.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: u32,
    pub size: u32,
    pub pixel_corners: [[f64; 2]; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rvec: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvec: Option<[f64; 3]>,
}

/// Behaviour shared by lazy and eager markers.
pub trait BaseMarker {
    fn observation(&self) -> &MarkerObservation;

    /// The marker pose, or [`ZolotoError::MissingCalibrations`].
    fn pose(&self) -> Result<&ComputedPose, ZolotoError>;

    fn is_eager(&self) -> bool;

    fn id(&self) -> u32 {
        self.observation().id()
    }

    fn size(&self) -> u32 {
        self.observation().size()
    }

    fn pixel_corners(&self) -> [Coordinates; 4] {
        self.observation().pixel_corners()
    }

    /// Centroid of [`Self::pixel_corners`].
    fn pixel_centre(&self) -> Coordinates {
        self.observation().pixel_centre()
    }

    fn rvec(&self) -> Result<[f64; 3], ZolotoError> {
        Ok(self.pose()?.vectors.rvec)
    }

    fn tvec(&self) -> Result<[f64; 3], ZolotoError> {
        Ok(self.pose()?.vectors.tvec)
    }

    /// Distance to the marker centre, truncated to an integer.
    fn distance(&self) -> Result<u32, ZolotoError> {
        Ok(self.pose()?.distance)
    }

    fn orientation(&self) -> Result<Orientation, ZolotoError> {
        Ok(self.pose()?.orientation)
    }

    fn spherical(&self) -> Result<Spherical, ZolotoError> {
        Ok(self.pose()?.spherical)
    }

    fn cartesian(&self) -> Result<ThreeDCoordinates, ZolotoError> {
        Ok(ThreeDCoordinates::from(self.pose()?.vectors.tvec))
    }

    /// Only a missing calibration is tolerated; other pose failures propagate.
    fn to_record(&self) -> Result<MarkerRecord, ZolotoError> {
        let obs = self.observation();
        let (rvec, tvec) = match self.pose() {
            Ok(p) => (Some(p.vectors.rvec), Some(p.vectors.tvec)),
            Err(ZolotoError::MissingCalibrations) => (None, None),
            Err(e) => return Err(e),
        };
        Ok(MarkerRecord {
            id: obs.id(),
            size: obs.size(),
            pixel_corners: obs.pixel_corners().map(<[f64; 2]>::from),
            rvec,
            tvec,
        })
    }
}

/// A marker whose pose is estimated on first access and then memoised.
///
/// Without calibration every pose access fails and nothing is cached.
#[derive(Debug)]
pub struct Marker {
    observation: MarkerObservation,
    calibration: Option<Arc<CalibrationParameters>>,
    pose: OnceCell<ComputedPose>,
}

impl Marker {
    pub fn new(
        observation: MarkerObservation,
        calibration: Option<Arc<CalibrationParameters>>,
    ) -> Self {
        Self {
            observation,
            calibration,
            pose: OnceCell::new(),
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationParameters> {
        self.calibration.as_deref()
    }

    /// Whether the pose has already been computed.
    pub fn is_pose_cached(&self) -> bool {
        self.pose.get().is_some()
    }
}

impl BaseMarker for Marker {
    fn observation(&self) -> &MarkerObservation {
        &self.observation
    }

    fn pose(&self) -> Result<&ComputedPose, ZolotoError> {
        if let Some(p) = self.pose.get() {
            return Ok(p);
        }
        let calibration = self
            .calibration
            .as_deref()
            .ok_or(ZolotoError::MissingCalibrations)?;
        let vectors = estimate_marker_pose(
            &self.observation.corner_points(),
            self.observation.size() as f64,
            calibration,
        )?;
        log::trace!("marker {} pose computed", self.observation.id());
        Ok(self.pose.get_or_init(|| ComputedPose::new(vectors)))
    }

    fn is_eager(&self) -> bool {
        false
    }
}

/// A marker built from pose vectors computed up front.
#[derive(Clone, Debug, PartialEq)]
pub struct EagerMarker {
    observation: MarkerObservation,
    pose: ComputedPose,
}

impl EagerMarker {
    pub fn new(observation: MarkerObservation, vectors: PoseVectors) -> Self {
        Self {
            observation,
            pose: ComputedPose::new(vectors),
        }
    }
}

impl BaseMarker for EagerMarker {
    fn observation(&self) -> &MarkerObservation {
        &self.observation
    }

    fn pose(&self) -> Result<&ComputedPose, ZolotoError> {
        Ok(&self.pose)
    }

    fn is_eager(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use zoloto_core::{marker_object_points, project_points, CameraIntrinsics};

    fn calibration() -> CalibrationParameters {
        CalibrationParameters::new(
            CameraIntrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 320.0,
                cy: 240.0,
            },
            &[],
            (640, 480),
        )
    }

    fn observation_at(tvec: [f64; 3], size: u32) -> MarkerObservation {
        let rot = nalgebra::Rotation3::from_euler_angles(std::f64::consts::PI, 0.0, 0.0);
        let pose = PoseVectors::from_parts(&rot, &nalgebra::Vector3::from(tvec));
        let px = project_points(&marker_object_points(size as f64), &pose, &calibration())
            .expect("in front of camera");
        MarkerObservation::new(7, size, [0, 1, 2, 3].map(|i| Coordinates::new(px[i].x, px[i].y)))
    }

    #[test]
    fn centre_is_mean_of_corners() {
        let obs = MarkerObservation::new(
            1,
            50,
            [
                Coordinates::new(10.0, 10.0),
                Coordinates::new(30.0, 12.0),
                Coordinates::new(28.0, 30.0),
                Coordinates::new(8.0, 28.0),
            ],
        );
        assert_eq!(obs.pixel_centre(), Coordinates::new(19.0, 20.0));
    }

    #[test]
    fn centre_of_skewed_quad_is_not_bounding_box_centre() {
        let corners = [
            Coordinates::new(0.0, 0.0),
            Coordinates::new(40.0, 0.0),
            Coordinates::new(40.0, 10.0),
            Coordinates::new(36.0, 10.0),
        ];
        let marker = Marker::new(MarkerObservation::new(2, 50, corners), None);
        assert_eq!(marker.pixel_centre(), Coordinates::new(29.0, 5.0));
        assert_eq!(marker.pixel_centre(), marker.observation().pixel_centre());
    }

    #[test]
    fn lazy_marker_without_calibration_always_errors() {
        let marker = Marker::new(observation_at([0.0, 0.0, 500.0], 100), None);
        assert!(!marker.is_eager());
        for _ in 0..2 {
            assert!(matches!(marker.pose(), Err(ZolotoError::MissingCalibrations)));
            assert!(matches!(marker.distance(), Err(ZolotoError::MissingCalibrations)));
        }
        assert!(!marker.is_pose_cached());

        let record = marker.to_record().expect("record");
        assert_eq!(record.id, 7);
        assert!(record.rvec.is_none() && record.tvec.is_none());
        let json = serde_json::to_value(&record).expect("json");
        assert!(json.get("rvec").is_none());
    }

    #[test]
    fn lazy_marker_computes_once() {
        let marker = Marker::new(
            observation_at([30.0, -20.0, 1200.0], 100),
            Some(Arc::new(calibration())),
        );
        assert!(!marker.is_pose_cached());
        let first = *marker.pose().expect("pose");
        assert!(marker.is_pose_cached());
        assert_eq!(*marker.pose().expect("pose"), first);

        let t = marker.tvec().expect("tvec");
        assert_relative_eq!(t[0], 30.0, epsilon = 1e-4);
        assert_relative_eq!(t[2], 1200.0, epsilon = 1e-3);
        // |(30, -20, 1200)| = 1200.54...
        assert_eq!(marker.distance().expect("distance"), 1200);

        let s = marker.spherical().expect("spherical");
        assert_relative_eq!(s.rot_x, (-20.0f64).atan2(1200.0), epsilon = 1e-6);
        assert_relative_eq!(s.rot_y, 30.0f64.atan2(1200.0), epsilon = 1e-6);
        assert_eq!(s.dist, 1200);
    }

    #[test]
    fn eager_marker_exposes_precomputed_vectors() {
        let vectors = PoseVectors::new([0.1, -0.2, 0.05], [3.0, 4.0, 12.9]);
        let marker = EagerMarker::new(observation_at([0.0, 0.0, 400.0], 80), vectors);
        assert!(marker.is_eager());
        assert_eq!(marker.rvec().expect("rvec"), vectors.rvec);
        assert_eq!(marker.distance().expect("distance"), 13);
        let c = marker.cartesian().expect("cartesian");
        assert_eq!((c.x, c.y, c.z), (3.0, 4.0, 12.9));
        let o = marker.orientation().expect("orientation");
        let back = o.rvec();
        for k in 0..3 {
            assert_relative_eq!(back[k], vectors.rvec[k], epsilon = 1e-9);
        }

        let record = marker.to_record().expect("record");
        assert_eq!(record.tvec, Some(vectors.tvec));
        assert_eq!(record.size, 80);
    }
}
