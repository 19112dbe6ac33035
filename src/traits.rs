use image::RgbImage;

use crate::detections::Detections;
use crate::errors::Result;

/// A model that finds object instances in a single RGB image.
///
/// The driver and renderer only depend on this trait, so tests can swap the
/// ONNX-backed model for a mock.
pub trait InstanceSegmentationModel {
    /// Detections in original-image coordinates, with full-size masks.
    fn detect(&self, image: &RgbImage) -> Result<Detections>;

    /// Number of classes the model predicts, background included.
    fn num_classes(&self) -> usize;
}
