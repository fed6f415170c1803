pub mod face;
pub mod snapshot;

pub use face::{FaceBox, FaceDetection, FaceDetectionLoop, FaceDetector};
pub use snapshot::SnapshotSurface;
