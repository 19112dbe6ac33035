use image::GrayImage;

use crate::errors::{InferError, Result};

/// One predicted instance, borrowed from a [`Detections`].
#[derive(Debug, Clone, Copy)]
pub struct Detection<'a> {
    /// `[x_min, y_min, x_max, y_max]` in image pixels.
    pub roi: [f32; 4],
    /// Binary mask the size of the image; non-zero pixels belong to the instance.
    pub mask: &'a GrayImage,
    pub class_id: usize,
    pub score: f32,
}

/// Detections for one image as parallel sequences of equal length.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    rois: Vec<[f32; 4]>,
    masks: Vec<GrayImage>,
    class_ids: Vec<usize>,
    scores: Vec<f32>,
}

impl Detections {
    pub fn new(
        rois: Vec<[f32; 4]>,
        masks: Vec<GrayImage>,
        class_ids: Vec<usize>,
        scores: Vec<f32>,
    ) -> Result<Self> {
        let len = rois.len();
        if masks.len() != len || class_ids.len() != len || scores.len() != len {
            return Err(InferError::DetectionShape {
                rois: rois.len(),
                masks: masks.len(),
                class_ids: class_ids.len(),
                scores: scores.len(),
            });
        }
        Ok(Self {
            rois,
            masks,
            class_ids,
            scores,
        })
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn rois(&self) -> &[[f32; 4]] {
        &self.rois
    }

    pub fn masks(&self) -> &[GrayImage] {
        &self.masks
    }

    pub fn class_ids(&self) -> &[usize] {
        &self.class_ids
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn get(&self, index: usize) -> Option<Detection<'_>> {
        Some(Detection {
            roi: *self.rois.get(index)?,
            mask: self.masks.get(index)?,
            class_id: *self.class_ids.get(index)?,
            score: *self.scores.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Detection<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_access() -> Result<()> {
        let detections = Detections::new(
            vec![[0.0, 0.0, 4.0, 4.0], [1.0, 1.0, 2.0, 2.0]],
            vec![GrayImage::new(8, 8), GrayImage::new(8, 8)],
            vec![1, 17],
            vec![0.9, 0.8],
        )?;

        assert_eq!(detections.len(), 2);
        let second = detections.get(1).unwrap();
        assert_eq!(second.class_id, 17);
        assert_eq!(second.score, 0.8);
        assert_eq!(detections.iter().count(), 2);
        assert!(detections.get(2).is_none());
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let err = Detections::new(
            vec![[0.0, 0.0, 1.0, 1.0]],
            vec![],
            vec![1],
            vec![0.9],
        )
        .unwrap_err();
        assert!(matches!(err, InferError::DetectionShape { masks: 0, .. }));
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Detections::default().is_empty());
    }
}
