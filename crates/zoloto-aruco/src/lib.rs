//! ArUco marker dictionaries, detection and rendering.
//!
//! This crate covers:
//! - embedded 4x4 dictionaries compatible with OpenCV's `DICT_4X4_50` / `DICT_4X4_100`,
//! - matching observed marker codes against those dictionaries,
//! - a square-marker detector (adaptive threshold, contours, quads, bit decoding),
//! - rendering markers to grayscale images.
//!
//! Pose estimation lives in `zoloto-core`; detections carry pixel corners only.

pub mod builtins;
mod contours;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quad;
mod render;
mod threshold;

pub use contours::{label_components, trace_outer_contours, Component, ComponentMap, Contour};
pub use decode::{decode_quad, ArucoScanParams, DecodedMarker, MAX_BORDER_BITS};
pub use detector::{ArucoDetector, DetectorParams, MarkerDetection};
pub use dictionary::Dictionary;
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use quad::{approx_polygon, find_quads, Quad};
pub use render::{render_marker, RenderError};
pub use threshold::{adaptive_threshold, otsu_threshold_from_samples, BinaryImage};
