#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const INPUT_SIZE: u32 = 640;
const CONFIDENCE_THRESHOLD: f32 = 0.25;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Loads a local model file and runs it on the CPU. The model is expected to
/// take `[1, 3, 640, 640]` RGB input in `0..1` and produce `[1, 4 + nc, anchors]`
/// (centre-xywh followed by per-class scores).
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            iou_threshold: NMS_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.channels() != 3 {
            return Err(anyhow!("tract backend expects 3-channel frames"));
        }
        let source: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.as_bytes())
                .ok_or_else(|| anyhow!("frame buffer does not fit its dimensions"))?;
        let resized = imageops::resize(&source, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let red_first = frame.order().is_red_first();
        let size = INPUT_SIZE as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let src_channel = if red_first { c } else { 2 - c };
            resized.get_pixel(x as u32, y as u32).0[src_channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let preds = preds
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;
        // Heads come either as [1, 4 + nc, anchors] or transposed [1, anchors, 4 + nc].
        let channel_major = shape[1] < shape[2];
        let (attrs, anchors) = if channel_major {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if attrs < 5 {
            return Err(anyhow!("model output has {} attributes, need at least 5", attrs));
        }
        let num_classes = attrs - 4;
        let at = |anchor: usize, attr: usize| -> f32 {
            if channel_major {
                preds[[0, attr, anchor]]
            } else {
                preds[[0, anchor, attr]]
            }
        };

        let sx = frame.width() as f32 / INPUT_SIZE as f32;
        let sy = frame.height() as f32 / INPUT_SIZE as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, confidence) = (0..num_classes)
                .map(|c| (c, at(anchor, 4 + c)))
                .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
            if confidence < self.confidence_threshold {
                continue;
            }
            let bbox = BoundingBox::from_center(
                at(anchor, 0),
                at(anchor, 1),
                at(anchor, 2),
                at(anchor, 3),
            )
            .scaled(sx, sy)
            .clamp_to(frame.width(), frame.height());
            candidates.push(Detection {
                bbox,
                confidence,
                class_id: class_id as u32,
                label: class_label(class_id, num_classes),
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = INPUT_SIZE as usize;
        let input = tract_ndarray::Array4::<f32>::zeros((1, 3, size, size)).into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up run failed")?;
        Ok(())
    }
}

fn class_label(class_id: usize, num_classes: usize) -> String {
    if num_classes == 1 {
        "license plate".to_string()
    } else {
        format!("class {}", class_id)
    }
}

/// Class-agnostic NMS, highest confidence first.
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, 0.0, 10.0, 10.0),
            confidence,
            class_id: 0,
            label: "license plate".to_string(),
        }
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(vec![det(0.0, 0.5), det(1.0, 0.9), det(50.0, 0.3)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].bbox.x, 50.0);
    }
}
