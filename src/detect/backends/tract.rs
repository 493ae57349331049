#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, GrayImage, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{CascadeParams, FaceDetector, ObjectDetector};
use crate::detect::result::{ObjectDetection, COCO_LABELS};
use crate::frame::{BoundingBox, Rect};

type Plan = TypedRunnableModel<TypedModel>;

const NMS_IOU: f32 = 0.45;

fn load_plan(model_path: &Path, width: u32, height: u32) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// Resize to the model input and lay out as NCHW with `normalize` applied per channel.
fn build_input(rgb: &RgbImage, width: u32, height: u32, normalize: impl Fn(u8) -> f32) -> Tensor {
    let resized = imageops::resize(rgb, width, height, imageops::FilterType::Triangle);
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| normalize(resized.get_pixel(x as u32, y as u32)[channel]),
    )
    .into_tensor()
}

// ----------------------------------------------------------------------------
// YOLOv8 object detector
// ----------------------------------------------------------------------------

/// YOLOv8-style ONNX object detector (output `[1, 4 + classes, anchors]`).
pub struct TractObjectDetector {
    plan: Plan,
    input_size: u32,
}

impl TractObjectDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), input_size, input_size)?;
        Ok(Self { plan, input_size })
    }
}

impl ObjectDetector for TractObjectDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_objects(
        &mut self,
        rgb: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<ObjectDetection>> {
        let input = build_input(rgb, self.input_size, self.input_size, |p| p as f32 / 255.0);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let sx = rgb.width() as f32 / self.input_size as f32;
        let sy = rgb.height() as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for anchor in 0..shape[2] {
            let (class_id, score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if score < min_confidence {
                continue;
            }
            let (cx, cy) = (view[[0, 0, anchor]], view[[0, 1, anchor]]);
            let (w, h) = (view[[0, 2, anchor]], view[[0, 3, anchor]]);
            let label = COCO_LABELS.get(class_id).copied().unwrap_or("unknown");
            candidates.push(ObjectDetection::new(
                label,
                score,
                BoundingBox::new(
                    (cx - w / 2.0) * sx,
                    (cy - h / 2.0) * sy,
                    (cx + w / 2.0) * sx,
                    (cy + h / 2.0) * sy,
                ),
            ));
        }
        Ok(non_max_suppression(candidates))
    }
}

// ----------------------------------------------------------------------------
// UltraFace face detector
// ----------------------------------------------------------------------------

/// UltraFace-style ONNX face detector (outputs scores `[1, N, 2]`, boxes `[1, N, 4]`).
pub struct TractFaceDetector {
    plan: Plan,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractFaceDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), width, height)?;
        Ok(Self {
            plan,
            width,
            height,
            confidence_threshold: 0.7,
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl FaceDetector for TractFaceDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_faces(
        &mut self,
        rgb: &RgbImage,
        _gray: &GrayImage,
        params: &CascadeParams,
    ) -> Result<Vec<Rect>> {
        let input = build_input(rgb, self.width, self.height, |p| (p as f32 - 127.0) / 128.0);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        if outputs.len() < 2 {
            return Err(anyhow!("face model must produce scores and boxes"));
        }
        let scores = outputs[0]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;
        let boxes = outputs[1]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let candidates = decode_faces(
            scores,
            boxes,
            self.confidence_threshold,
            rgb.width() as f32,
            rgb.height() as f32,
        )?;
        Ok(non_max_suppression(candidates)
            .iter()
            .filter_map(|d| d.bbox.to_rect(rgb.width(), rgb.height()))
            .filter(|rect| params.admits(rect))
            .collect())
    }
}

/// Face candidates from UltraFace outputs, boxes scaled to the frame size.
fn decode_faces(
    scores: tract_ndarray::ArrayViewD<f32>,
    boxes: tract_ndarray::ArrayViewD<f32>,
    threshold: f32,
    fw: f32,
    fh: f32,
) -> Result<Vec<ObjectDetection>> {
    let (score_shape, box_shape) = (scores.shape(), boxes.shape());
    let count = match (score_shape, box_shape) {
        ([1, n, 2], [1, m, 4]) if n == m => *n,
        _ => {
            return Err(anyhow!(
                "unexpected face model output shapes: scores {:?}, boxes {:?}",
                score_shape,
                box_shape
            ))
        }
    };
    let mut candidates = Vec::new();
    for i in 0..count {
        let score = scores[[0, i, 1]];
        if score < threshold {
            continue;
        }
        candidates.push(ObjectDetection::new(
            "face",
            score,
            BoundingBox::new(
                boxes[[0, i, 0]] * fw,
                boxes[[0, i, 1]] * fh,
                boxes[[0, i, 2]] * fw,
                boxes[[0, i, 3]] * fh,
            ),
        ));
    }
    Ok(candidates)
}

// ----------------------------------------------------------------------------
// Shared post-processing
// ----------------------------------------------------------------------------

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-label suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<ObjectDetection>) -> Vec<ObjectDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<ObjectDetection> = Vec::new();
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.label == cand.label && iou(&k.bbox, &cand.bbox) > NMS_IOU);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(vec![
            ObjectDetection::new("book", 0.6, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            ObjectDetection::new("book", 0.9, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            ObjectDetection::new("cell phone", 0.5, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label, "cell phone");
    }

    #[test]
    fn face_outputs_are_decoded_and_bad_shapes_rejected() {
        let scores =
            tract_ndarray::Array3::from_shape_vec((1, 2, 2), vec![0.1, 0.9, 0.8, 0.2]).unwrap();
        let boxes = tract_ndarray::Array3::from_shape_vec(
            (1, 2, 4),
            vec![0.1, 0.1, 0.5, 0.5, 0.0, 0.0, 1.0, 1.0],
        )
        .unwrap();
        let faces = decode_faces(scores.view().into_dyn(), boxes.view().into_dyn(), 0.7, 100.0, 200.0)
            .unwrap();
        assert_eq!(faces.len(), 1);
        assert!((faces[0].bbox.x2 - 50.0).abs() < 1e-4);
        assert!((faces[0].bbox.y2 - 100.0).abs() < 1e-4);

        let narrow = tract_ndarray::Array3::<f32>::zeros((1, 2, 1));
        assert!(
            decode_faces(narrow.view().into_dyn(), boxes.view().into_dyn(), 0.7, 100.0, 200.0)
                .is_err()
        );
        let flat = tract_ndarray::Array2::<f32>::zeros((2, 4));
        assert!(
            decode_faces(scores.view().into_dyn(), flat.view().into_dyn(), 0.7, 100.0, 200.0)
                .is_err()
        );
    }
}
