mod common;

use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zoloto::{
    find_camera_ids, BaseCamera, BaseMarker, Camera, CameraConfig, CameraError, CaptureBackend,
    MarkerProcessor, MarkerSize, MarkerType, SnapshotCamera, VideoCapture, ZolotoError,
    MAX_CAMERA_SCAN,
};

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    releases: AtomicUsize,
    resolution: Mutex<Option<(u32, u32)>>,
}

/// Backend whose devices in `present` open and return `frame`.
struct FakeBackend {
    present: Vec<u32>,
    frame: RgbImage,
    counters: Arc<Counters>,
}

impl FakeBackend {
    fn new(present: impl IntoIterator<Item = u32>) -> Self {
        Self {
            present: present.into_iter().collect(),
            frame: common::flat_frame(3),
            counters: Arc::default(),
        }
    }

    fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }
}

struct FakeCapture {
    camera_id: u32,
    opened: bool,
    released: bool,
    frame: RgbImage,
    counters: Arc<Counters>,
}

impl CaptureBackend for FakeBackend {
    fn open(&self, camera_id: u32) -> Result<Box<dyn VideoCapture>, CameraError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            camera_id,
            opened: self.present.contains(&camera_id),
            released: false,
            frame: self.frame.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

impl VideoCapture for FakeCapture {
    fn is_opened(&self) -> bool {
        self.opened && !self.released
    }

    fn read(&mut self) -> Result<RgbImage, CameraError> {
        if !self.is_opened() {
            return Err(CameraError::ReadFailed(self.camera_id));
        }
        Ok(self.frame.clone())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        *self.counters.resolution.lock().expect("lock") = Some((width, height));
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn processor() -> MarkerProcessor {
    MarkerProcessor::new(MarkerType::Dict4x4_50, MarkerSize::Fixed(100), None)
}

#[test]
fn finds_every_scanned_camera() {
    let backend = FakeBackend::new(0..100);
    let ids = find_camera_ids(&backend);
    assert_eq!(ids, (0..MAX_CAMERA_SCAN).collect::<Vec<_>>());
    assert_eq!(ids.len(), 8);
    assert_eq!(backend.opens(), 8);
    assert_eq!(backend.releases(), 8);
}

#[test]
fn finds_no_cameras_when_none_open() {
    let backend = FakeBackend::new([]);
    assert!(find_camera_ids(&backend).is_empty());
    assert_eq!(backend.releases(), 8);
}

#[test]
fn finds_only_attached_cameras() {
    let backend = FakeBackend::new([1, 4, 12]);
    assert_eq!(find_camera_ids(&backend), vec![1, 4]);
}

#[test]
fn discover_opens_one_camera_per_id() {
    let backend = FakeBackend::new([0, 2]);
    let cameras = Camera::discover(&backend, &CameraConfig::default()).expect("discover");
    let ids: Vec<u32> = cameras.iter().map(Camera::camera_id).collect();
    assert_eq!(ids, vec![0, 2]);

    let before = backend.releases();
    drop(cameras);
    assert_eq!(backend.releases(), before + 2);
}

#[test]
fn discover_all_eight_cameras() {
    let want: Vec<u32> = (0..MAX_CAMERA_SCAN).collect();
    assert_eq!(want.len(), 8);

    let backend = FakeBackend::new(0..100);
    let cameras = Camera::discover(&backend, &CameraConfig::default()).expect("discover");
    assert_eq!(cameras.len(), 8);
    let ids: Vec<u32> = cameras.iter().map(Camera::camera_id).collect();
    assert_eq!(ids, want);

    let snapshots = SnapshotCamera::discover(
        Arc::new(FakeBackend::new(0..100)),
        &CameraConfig::default(),
    )
    .expect("discover");
    assert_eq!(snapshots.len(), 8);
    let ids: Vec<u32> = snapshots.iter().map(SnapshotCamera::camera_id).collect();
    assert_eq!(ids, want);
}

#[test]
fn discover_with_no_cameras_is_empty() {
    let backend = FakeBackend::new([]);
    let cameras = Camera::discover(&backend, &CameraConfig::default()).expect("discover");
    assert!(cameras.is_empty());
    let snapshots =
        SnapshotCamera::discover(Arc::new(backend), &CameraConfig::default()).expect("discover");
    assert!(snapshots.is_empty());
}

#[test]
fn missing_camera_is_not_found() {
    let backend = FakeBackend::new([0]);
    let err = Camera::open(&backend, 5, processor()).expect_err("camera 5 is absent");
    assert!(matches!(err, CameraError::NotFound(5)));
    assert_eq!(backend.releases(), 1);
}

#[test]
fn camera_processes_frames_until_closed() {
    let backend = FakeBackend::new([0]);
    let mut camera = Camera::open(&backend, 0, processor()).expect("open");

    let markers = camera.process_frame().expect("frame");
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].id(), 3);
    assert_eq!(markers[0].size(), 100);
    assert!(matches!(markers[0].distance(), Err(ZolotoError::MissingCalibrations)));
    assert_eq!(camera.get_visible_markers().expect("frame"), vec![3]);

    // eager markers need calibration
    assert!(matches!(
        camera.process_frame_eager(),
        Err(ZolotoError::MissingCalibrations)
    ));

    camera.close();
    assert!(matches!(
        camera.capture_frame(),
        Err(CameraError::ReadFailed(0))
    ));
    drop(camera);
    assert_eq!(backend.releases(), 1);
}

#[test]
fn calibrated_camera_applies_resolution() {
    let backend = FakeBackend::new([0]);
    let processor = MarkerProcessor::new(
        MarkerType::Dict4x4_50,
        MarkerSize::Fixed(100),
        Some(common::calibration()),
    );
    let _camera = Camera::open(&backend, 0, processor).expect("open");
    assert_eq!(
        *backend.counters.resolution.lock().expect("lock"),
        Some((640, 480))
    );
}

#[test]
fn snapshot_camera_releases_after_every_frame() {
    let backend = Arc::new(FakeBackend::new([1]));
    let shared: Arc<dyn CaptureBackend> = backend.clone();
    let mut camera = SnapshotCamera::new(shared, 1, processor());

    for _ in 0..3 {
        let markers = camera.process_frame().expect("frame");
        assert_eq!(markers.len(), 1);
    }
    assert_eq!(backend.opens(), 3);
    assert_eq!(backend.releases(), 3);

    let mut absent = SnapshotCamera::new(backend.clone(), 6, processor());
    assert!(matches!(absent.capture_frame(), Err(CameraError::NotFound(6))));
    assert_eq!(backend.releases(), 4);
}

#[test]
fn annotated_frame_is_saved() {
    let backend = FakeBackend::new([0]);
    let mut camera = Camera::open(&backend, 0, processor()).expect("open");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("frame.png");

    let saved = camera.save_frame(&path, true).expect("save");
    assert_ne!(saved, backend.frame);
    let reloaded = image::open(&path).expect("reload").to_rgb8();
    assert_eq!(reloaded, saved);
}
