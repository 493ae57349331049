pub mod projection;
pub mod scripted;
pub mod skin;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use projection::ProjectionEyeDetector;
pub use scripted::{ScriptedEyeDetector, ScriptedFaceDetector, ScriptedObjectDetector};
pub use skin::SkinToneFaceDetector;

#[cfg(feature = "backend-tract")]
pub use tract::{TractFaceDetector, TractObjectDetector};
