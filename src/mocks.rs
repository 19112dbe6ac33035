use image::{GrayImage, Luma, RgbImage};

use crate::detections::Detections;
use crate::errors::Result;
use crate::traits::InstanceSegmentationModel;

/// Test model that reports a single fixed instance covering the centre of the image.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub class_id: usize,
    pub score: f32,
    pub num_classes: usize,
}

impl MockSegmentationModel {
    pub const fn new(class_id: usize) -> Self {
        Self {
            class_id,
            score: 0.9,
            num_classes: 81,
        }
    }
}

impl InstanceSegmentationModel for MockSegmentationModel {
    fn detect(&self, image: &RgbImage) -> Result<Detections> {
        let (width, height) = image.dimensions();
        let (x_min, y_min) = (width / 4, height / 4);
        let (x_max, y_max) = (width - width / 4, height - height / 4);

        let mut mask = GrayImage::new(width, height);
        for y in y_min..y_max {
            for x in x_min..x_max {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        Detections::new(
            vec![[x_min as f32, y_min as f32, x_max as f32, y_max as f32]],
            vec![mask],
            vec![self.class_id],
            vec![self.score],
        )
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Test model that never finds anything.
#[derive(Debug, Clone, Default)]
pub struct EmptyModel;

impl InstanceSegmentationModel for EmptyModel {
    fn detect(&self, _image: &RgbImage) -> Result<Detections> {
        Ok(Detections::default())
    }

    fn num_classes(&self) -> usize {
        81
    }
}
