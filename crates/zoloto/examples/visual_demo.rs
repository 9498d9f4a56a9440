//! Capture frames from camera 0, annotate them and report per-frame timings.
//!
//! Usage: `cargo run -p zoloto --example visual_demo --features opencv -- [frames] [out.png]`
//!
//! The last annotated frame is written to `out.png` (default `demo.png`).

use std::time::Instant;
use zoloto::{BaseCamera, Camera, MarkerProcessor, MarkerSize, MarkerType, OpenCvBackend};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    zoloto::core::init_from_env(log::LevelFilter::Info)?;

    let mut args = std::env::args().skip(1);
    let frames: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(100);
    let out = args.next().unwrap_or_else(|| "demo.png".to_string());

    let processor = MarkerProcessor::new(MarkerType::Dict4x4_50, MarkerSize::Fixed(100), None);
    let mut camera = Camera::open(&OpenCvBackend, 0, processor)?;

    let mut last = None;
    for i in 0..frames {
        let t0 = Instant::now();
        let mut frame = camera.capture_frame()?;
        let capture_ms = t0.elapsed().as_millis();

        let t1 = Instant::now();
        camera.annotate_frame(&mut frame);
        let annotate_ms = t1.elapsed().as_millis();

        log::info!("frame {i}: capture {capture_ms} ms, annotate {annotate_ms} ms");
        last = Some(frame);
    }

    if let Some(frame) = last {
        frame.save(&out)?;
        log::info!("last frame written to {out}");
    }
    camera.close();
    Ok(())
}
