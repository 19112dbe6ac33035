use std::path::Path;

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    config::InferenceConfig,
    detections::Detections,
    errors::{InferError, Result},
    imageops_ai::{mask::paste_mask, padding::pad_to_multiple},
    traits::InstanceSegmentationModel,
};

/// Graph outputs in the order the exported Mask R-CNN declares them.
const OUTPUT_COUNT: usize = 4;

/// Mask R-CNN exported to ONNX and run through ONNX Runtime.
///
/// The graph takes one BGR, mean-subtracted CHW image and returns boxes
/// `[N, 4]`, labels `[N]`, scores `[N]` and per-box mask probabilities
/// `[N, 1, 28, 28]`, with boxes in input-tensor coordinates.
pub struct MaskRcnn {
    config: InferenceConfig,
    input_name: String,
    output_names: [String; OUTPUT_COUNT],
    session: Mutex<Session>,
}

/// Owned copies of the raw graph outputs for one image.
#[derive(Debug, Clone)]
pub struct RawOutputs {
    pub boxes: Array2<f32>,
    pub labels: Array1<i64>,
    pub scores: Array1<f32>,
    pub masks: Array4<f32>,
}

impl MaskRcnn {
    /// Builds the session and loads the weights from `weights`.
    pub fn new(weights: &Path, device_id: i32, config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        info!("Loading model weights from {}", weights.display());
        let session = SessionBuilder::new()
            .map_err(|e| InferError::model("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| InferError::model("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| InferError::model("memory pattern setup", e))?
            .commit_from_file(weights)
            .map_err(|e| InferError::model(format!("load weights: {}", weights.display()), e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| InferError::Validation {
                field: "model".to_string(),
                reason: "declares no inputs".to_string(),
            })?;

        if session.outputs.len() < OUTPUT_COUNT {
            return Err(InferError::Validation {
                field: "model".to_string(),
                reason: format!(
                    "declares {} outputs, expected {} (boxes, labels, scores, masks)",
                    session.outputs.len(),
                    OUTPUT_COUNT
                ),
            });
        }
        let output_names: [String; OUTPUT_COUNT] =
            std::array::from_fn(|i| session.outputs[i].name.clone());

        debug!("Model input: {}, outputs: {:?}", input_name, output_names);
        info!("Model loaded");

        Ok(Self {
            config,
            input_name,
            output_names,
            session: Mutex::new(session),
        })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn run(&self, tensor: &Array3<f32>) -> Result<RawOutputs> {
        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;

        let [boxes, labels, scores, masks] = &self.output_names;
        let raw = RawOutputs {
            boxes: outputs[boxes.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix2>()?
                .to_owned(),
            labels: outputs[labels.as_str()]
                .try_extract_array::<i64>()?
                .into_dimensionality::<Ix1>()?
                .to_owned(),
            scores: outputs[scores.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix1>()?
                .to_owned(),
            masks: outputs[masks.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix4>()?
                .to_owned(),
        };
        Ok(raw)
    }
}

impl InstanceSegmentationModel for MaskRcnn {
    fn detect(&self, image: &RgbImage) -> Result<Detections> {
        let (width, height) = image.dimensions();
        let (tensor, scale) = preprocess(image, &self.config)?;
        debug!(
            "Input tensor {:?} for {}x{} image (scale {:.3})",
            tensor.shape(),
            width,
            height,
            scale
        );

        let raw = self.run(&tensor)?;
        debug!("Model returned {} candidate(s)", raw.scores.len());
        postprocess(raw, scale, width, height, &self.config)
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }
}

/// Resizes, pads and normalizes `image` into the CHW BGR tensor the graph expects.
///
/// Returns the tensor and the resize scale.
pub fn preprocess(image: &RgbImage, config: &InferenceConfig) -> Result<(Array3<f32>, f32)> {
    let (width, height) = image.dimensions();
    let scale = config.resize_scale(width, height);
    let resized_width = ((width as f32 * scale).round() as u32).max(1);
    let resized_height = ((height as f32 * scale).round() as u32).max(1);
    let resized = imageops::resize(image, resized_width, resized_height, FilterType::Triangle);

    // Padding in the mean color normalizes to roughly zero.
    let [b, g, r] = config.pixel_mean.map(|v| v.round().clamp(0.0, 255.0) as u8);
    let padded = pad_to_multiple(&resized, config.size_divisibility, Rgb([r, g, b])).ok_or_else(
        || InferError::Validation {
            field: "size_divisibility".to_string(),
            reason: "must be at least 1".to_string(),
        },
    )?;

    let mut tensor = padded
        .as_ndarray3()
        .slice_move(s![..;-1, .., ..])
        .mapv(f32::from);
    for (mut channel, mean) in tensor.axis_iter_mut(Axis(0)).zip(config.pixel_mean) {
        channel.mapv_inplace(|v| v - mean);
    }

    Ok((tensor, scale))
}

/// Turns raw graph outputs into [`Detections`] for an image of `width` x `height`.
///
/// Candidates under the confidence threshold are dropped, the rest are kept
/// best-first up to `detection_max_instances`.
pub fn postprocess(
    raw: RawOutputs,
    scale: f32,
    width: u32,
    height: u32,
    config: &InferenceConfig,
) -> Result<Detections> {
    let count = raw.scores.len();
    if raw.boxes.nrows() != count || raw.labels.len() != count || raw.masks.shape()[0] != count {
        return Err(InferError::DetectionShape {
            rois: raw.boxes.nrows(),
            masks: raw.masks.shape()[0],
            class_ids: raw.labels.len(),
            scores: count,
        });
    }
    if count > 0 && (raw.boxes.ncols() != 4 || raw.masks.shape()[1] == 0) {
        return Err(InferError::Validation {
            field: "model output".to_string(),
            reason: format!(
                "unexpected boxes {:?} / masks {:?}",
                raw.boxes.shape(),
                raw.masks.shape()
            ),
        });
    }

    let mut order: Vec<usize> = (0..count)
        .filter(|&i| raw.scores[i] >= config.detection_min_confidence)
        .collect();
    order.sort_by(|&a, &b| raw.scores[b].total_cmp(&raw.scores[a]));
    order.truncate(config.detection_max_instances);

    let (w, h) = (width as f32, height as f32);
    let mut rois = Vec::with_capacity(order.len());
    let mut masks = Vec::with_capacity(order.len());
    let mut class_ids = Vec::with_capacity(order.len());
    let mut scores = Vec::with_capacity(order.len());

    for i in order {
        let label = raw.labels[i];
        let class_id = usize::try_from(label)
            .ok()
            .filter(|&id| id < config.num_classes)
            .ok_or(InferError::InvalidClassId {
                id: label.max(0) as usize,
                count: config.num_classes,
            })?;

        let roi = [
            (raw.boxes[[i, 0]] / scale).clamp(0.0, w),
            (raw.boxes[[i, 1]] / scale).clamp(0.0, h),
            (raw.boxes[[i, 2]] / scale).clamp(0.0, w),
            (raw.boxes[[i, 3]] / scale).clamp(0.0, h),
        ];
        let mask = paste_mask(
            raw.masks.slice(s![i, 0, .., ..]),
            roi,
            width,
            height,
            config.mask_threshold,
        )
        .map_err(|e| InferError::ImageProcessing {
            path: "unknown".to_string(),
            operation: "mask pasting".to_string(),
            source: e.into(),
        })?;

        rois.push(roi);
        masks.push(mask);
        class_ids.push(class_id);
        scores.push(raw.scores[i]);
    }

    Detections::new(rois, masks, class_ids, scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_outputs(scores: Vec<f32>, labels: Vec<i64>) -> RawOutputs {
        let n = scores.len();
        let boxes = Array2::from_shape_fn((n, 4), |(_, c)| [10.0, 20.0, 30.0, 40.0][c]);
        RawOutputs {
            boxes,
            labels: Array1::from(labels),
            scores: Array1::from(scores),
            masks: Array4::ones((n, 1, 28, 28)),
        }
    }

    #[test]
    fn test_preprocess_shape_and_normalization() -> Result<()> {
        let config = InferenceConfig::default();
        let image = RgbImage::from_pixel(500, 400, Rgb([123, 116, 103]));
        let (tensor, scale) = preprocess(&image, &config)?;

        assert_eq!(scale, 2.0);
        // 1000x800 padded to multiples of 32.
        assert_eq!(tensor.shape(), &[3, 800, 1024]);
        assert!(tensor.iter().all(|v| v.abs() < 1.5));
        Ok(())
    }

    #[test]
    fn test_preprocess_is_bgr() -> Result<()> {
        let config = InferenceConfig::default();
        let image = RgbImage::from_pixel(800, 800, Rgb([255, 0, 0]));
        let (tensor, _) = preprocess(&image, &config)?;

        assert!((tensor[[2, 0, 0]] - (255.0 - 122.7717)).abs() < 1.5);
        assert!((tensor[[0, 0, 0]] + 102.9801).abs() < 1.5);
        Ok(())
    }

    #[test]
    fn test_new_rejects_batched_config() {
        let config = InferenceConfig {
            images_per_batch: 4,
            ..InferenceConfig::default()
        };
        let result = MaskRcnn::new(Path::new("/no/such/model.onnx"), 0, config);
        assert!(matches!(result, Err(InferError::Validation { .. })));
    }

    #[test]
    fn test_postprocess_filters_and_sorts() -> Result<()> {
        let config = InferenceConfig::default();
        let raw = raw_outputs(vec![0.75, 0.2, 0.95], vec![1, 2, 3]);

        let detections = postprocess(raw, 2.0, 100, 100, &config)?;

        assert_eq!(detections.class_ids(), &[3, 1]);
        assert_eq!(detections.scores(), &[0.95, 0.75]);
        assert_eq!(detections.rois()[0], [5.0, 10.0, 15.0, 20.0]);
        let mask = &detections.masks()[0];
        assert_eq!(mask.dimensions(), (100, 100));
        assert_eq!(mask.get_pixel(7, 12).0[0], 255);
        assert_eq!(mask.get_pixel(50, 50).0[0], 0);
        Ok(())
    }

    #[test]
    fn test_postprocess_caps_instances() -> Result<()> {
        let config = InferenceConfig {
            detection_max_instances: 1,
            ..InferenceConfig::default()
        };
        let raw = raw_outputs(vec![0.8, 0.9], vec![1, 1]);

        let detections = postprocess(raw, 1.0, 64, 64, &config)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections.scores(), &[0.9]);
        Ok(())
    }

    #[test]
    fn test_postprocess_rejects_unknown_label() {
        let config = InferenceConfig::default();
        let raw = raw_outputs(vec![0.9], vec![81]);

        let err = postprocess(raw, 1.0, 64, 64, &config).unwrap_err();
        assert!(matches!(err, InferError::InvalidClassId { id: 81, .. }));
    }

    #[test]
    fn test_postprocess_rejects_ragged_outputs() {
        let config = InferenceConfig::default();
        let mut raw = raw_outputs(vec![0.9, 0.8], vec![1, 2]);
        raw.labels = Array1::from(vec![1]);

        let err = postprocess(raw, 1.0, 64, 64, &config).unwrap_err();
        assert!(matches!(err, InferError::DetectionShape { .. }));
    }
}
