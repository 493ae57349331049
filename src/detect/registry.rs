use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, EyeDetector, FaceDetector, ObjectDetector};
use super::backends::{ProjectionEyeDetector, ScriptedObjectDetector, SkinToneFaceDetector};
use crate::config::ProctorConfig;

type FaceFactory = Box<dyn Fn(&ProctorConfig) -> Result<Box<dyn FaceDetector>> + Send + Sync>;
type EyeFactory = Box<dyn Fn(&ProctorConfig) -> Result<Box<dyn EyeDetector>> + Send + Sync>;
type ObjectFactory =
    Box<dyn Fn(&ProctorConfig) -> Result<Box<dyn ObjectDetector>> + Send + Sync>;

/// Registry of detector constructors keyed by backend name.
///
/// Configuration names backends (`face.backend`, `face.eye_backend`,
/// `objects.backend`); the registry turns those names into boxed detectors.
pub struct BackendRegistry {
    faces: HashMap<String, FaceFactory>,
    eyes: HashMap<String, EyeFactory>,
    objects: HashMap<String, ObjectFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            faces: HashMap::new(),
            eyes: HashMap::new(),
            objects: HashMap::new(),
        }
    }

    /// Registry populated with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_faces("skin", |_| Ok(Box::new(SkinToneFaceDetector::new())));
        registry.register_eyes("projection", |_| Ok(Box::new(ProjectionEyeDetector::new())));
        registry.register_objects("none", |_| Ok(Box::new(ScriptedObjectDetector::empty())));

        #[cfg(feature = "backend-tract")]
        {
            use super::backends::{TractFaceDetector, TractObjectDetector};
            registry.register_faces("tract", |cfg| {
                let path = cfg
                    .face
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("face.model_path is required for the tract backend"))?;
                Ok(Box::new(TractFaceDetector::new(path, 320, 240)?))
            });
            registry.register_objects("tract", |cfg| {
                let path = cfg.objects.model_path.as_ref().ok_or_else(|| {
                    anyhow!("objects.model_path is required for the tract backend")
                })?;
                Ok(Box::new(TractObjectDetector::new(
                    path,
                    cfg.objects.input_size,
                )?))
            });
        }
        registry
    }

    pub fn register_faces<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProctorConfig) -> Result<Box<dyn FaceDetector>> + Send + Sync + 'static,
    {
        self.faces.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_eyes<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProctorConfig) -> Result<Box<dyn EyeDetector>> + Send + Sync + 'static,
    {
        self.eyes.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_objects<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProctorConfig) -> Result<Box<dyn ObjectDetector>> + Send + Sync + 'static,
    {
        self.objects.insert(name.to_string(), Box::new(factory));
    }

    pub fn face_detector(&self, cfg: &ProctorConfig) -> Result<Box<dyn FaceDetector>> {
        let factory = self
            .faces
            .get(&cfg.face.backend)
            .ok_or_else(|| unknown(DetectionCapability::Faces, &cfg.face.backend))?;
        factory(cfg)
    }

    pub fn eye_detector(&self, cfg: &ProctorConfig) -> Result<Box<dyn EyeDetector>> {
        let factory = self
            .eyes
            .get(&cfg.face.eye_backend)
            .ok_or_else(|| unknown(DetectionCapability::Eyes, &cfg.face.eye_backend))?;
        factory(cfg)
    }

    pub fn object_detector(&self, cfg: &ProctorConfig) -> Result<Box<dyn ObjectDetector>> {
        let factory = self
            .objects
            .get(&cfg.objects.backend)
            .ok_or_else(|| unknown(DetectionCapability::Objects, &cfg.objects.backend))?;
        factory(cfg)
    }

    /// Registered backend names for a capability, sorted.
    pub fn list(&self, capability: DetectionCapability) -> Vec<String> {
        let mut names: Vec<String> = match capability {
            DetectionCapability::Faces => self.faces.keys().cloned().collect(),
            DetectionCapability::Eyes => self.eyes.keys().cloned().collect(),
            DetectionCapability::Objects => self.objects.keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn unknown(capability: DetectionCapability, name: &str) -> anyhow::Error {
    anyhow!("no {:?} backend registered under '{}'", capability, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn builtin_backends_resolve_from_defaults() {
        let registry = BackendRegistry::with_builtin();
        let cfg = ProctorConfig::defaults(Profile::Webcam);
        assert_eq!(registry.face_detector(&cfg).unwrap().name(), "skin");
        assert_eq!(registry.eye_detector(&cfg).unwrap().name(), "projection");
        assert_eq!(registry.object_detector(&cfg).unwrap().name(), "scripted");
        assert!(registry
            .list(DetectionCapability::Objects)
            .contains(&"none".to_string()));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let registry = BackendRegistry::with_builtin();
        let mut cfg = ProctorConfig::defaults(Profile::Side);
        cfg.objects.backend = "yolo-cloud".to_string();
        let err = registry.object_detector(&cfg).err().unwrap();
        assert!(err.to_string().contains("yolo-cloud"));
    }
}
