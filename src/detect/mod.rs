mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{CascadeParams, DetectionCapability, EyeDetector, FaceDetector, ObjectDetector};
pub use backends::{
    ProjectionEyeDetector, ScriptedEyeDetector, ScriptedFaceDetector, ScriptedObjectDetector,
    SkinToneFaceDetector,
};
pub use registry::BackendRegistry;
pub use result::{ObjectDetection, COCO_LABELS};
