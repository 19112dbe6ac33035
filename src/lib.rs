pub mod classes;
pub mod colors;
pub mod config;
pub mod detections;
pub mod errors;
pub mod files;
pub mod imageops_ai;
pub mod model;
pub mod traits;
pub mod visualize;

pub mod mocks;

use std::path::{Path, PathBuf};

use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

pub use classes::CLASS_NAMES;
pub use config::{Config, InferenceConfig};
pub use detections::{Detection, Detections};
pub use errors::{InferError, Result};
pub use model::MaskRcnn;
pub use traits::InstanceSegmentationModel;
pub use visualize::Visualizer;

/// Runs a model over images one at a time and saves the rendered results.
pub struct InferenceRunner<M: InstanceSegmentationModel> {
    model: M,
    visualizer: Visualizer,
    output_dir: PathBuf,
}

impl<M: InstanceSegmentationModel> InferenceRunner<M> {
    pub fn new(model: M, visualizer: Visualizer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            model,
            visualizer,
            output_dir: output_dir.into(),
        }
    }

    /// Processes `images` in order. The first failure stops the run.
    pub fn run_inference(&self, images: &[PathBuf]) -> Result<()> {
        let num_images = images.len();

        let pb = ProgressBar::new(num_images as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for (count, path) in images.iter().enumerate() {
            let image = load_image(path)?;
            info!("Running detection for image {}/{}", count + 1, num_images);
            self.process_image(path, &image)?;
            pb.inc(1);
        }

        pb.finish_with_message("done");
        info!("Processed {} image(s)", num_images);
        Ok(())
    }

    /// Detects, renders and saves one image. Returns the path written.
    pub fn process_image(&self, path: &Path, image: &RgbImage) -> Result<PathBuf> {
        let detections = self.model.detect(image)?;
        let colors = colors::get_colors(self.model.num_classes(), detections.class_ids())?;
        let rendered =
            self.visualizer
                .display_instances(image, &detections, &CLASS_NAMES, &colors)?;

        let save_path = output_path(path, &self.output_dir)?;
        info!("Saving image: {}", save_path.display());
        rendered
            .save(&save_path)
            .map_err(|e| InferError::ImageProcessing {
                path: save_path.display().to_string(),
                operation: "save image".to_string(),
                source: Box::new(e),
            })?;

        Ok(save_path)
    }
}

impl InferenceRunner<MaskRcnn> {
    /// Loads the ONNX model and font named by `config`.
    pub fn with_onnx_model(config: &Config) -> Result<Self> {
        let model = MaskRcnn::new(&config.weights, config.device_id, config.inference_config())?;
        debug!("Inference config: {:?}", model.config());
        let visualizer = match &config.font {
            Some(font) => Visualizer::with_font(font)?,
            None => {
                warn!("No font given, captions will not be drawn");
                Visualizer::default()
            }
        };
        Ok(Self::new(model, visualizer, config.output_dir.clone()))
    }
}

/// Loads an image and checks that it has color channels. Alpha is dropped.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).map_err(|e| InferError::ImageProcessing {
        path: path.display().to_string(),
        operation: "load image".to_string(),
        source: Box::new(e),
    })?;

    let channels = image.color().channel_count();
    if channels < 3 {
        error!("Loaded image {} is not RGB, please use RGB images", path.display());
        return Err(InferError::NotRgb {
            path: path.to_path_buf(),
            channels,
        });
    }

    Ok(image.into_rgb8())
}

/// `output_dir` joined with the file name of `path`.
pub fn output_path(path: &Path, output_dir: &Path) -> Result<PathBuf> {
    path.file_name()
        .map(|name| output_dir.join(name))
        .ok_or_else(|| InferError::Validation {
            field: "input path".to_string(),
            reason: format!("{} has no file name", path.display()),
        })
}

/// Input images for a run: discovered, sorted by path and cut to `--limit`.
pub fn select_images(config: &Config) -> Result<Vec<PathBuf>> {
    let mut images = files::get_files_list(&config.input_dir, &config.image_format)?;
    images.sort();
    if let Some(limit) = config.limit {
        images.truncate(limit);
    }
    info!(
        "Found {} image(s) with extension {} in {}",
        images.len(),
        config.image_format,
        config.input_dir.display()
    );
    Ok(images)
}

/// Validates `config`, discovers the input images and runs the ONNX model over them.
pub fn run(config: &Config) -> Result<()> {
    config.validate()?;
    let images = select_images(config)?;
    InferenceRunner::with_onnx_model(config)?.run_inference(&images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb};
    use tempfile::TempDir;

    #[test]
    fn test_output_path_keeps_file_name() -> Result<()> {
        let path = output_path(Path::new("/data/in/cat.png"), Path::new("/data/out"))?;
        assert_eq!(path, Path::new("/data/out/cat.png"));
        assert!(output_path(Path::new("/"), Path::new("/data/out")).is_err());
        Ok(())
    }

    fn config_with_images(temp_dir: &TempDir, names: &[&str], limit: Option<usize>) -> Result<Config> {
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir)?;
        for name in names {
            std::fs::write(input_dir.join(name), b"")?;
        }
        Ok(Config {
            input_dir,
            output_dir: temp_dir.path().join("output"),
            image_format: ".png".to_string(),
            weights: temp_dir.path().join("mask_rcnn_coco.onnx"),
            device_id: 0,
            min_confidence: 0.7,
            font: None,
            limit,
        })
    }

    #[test]
    fn test_select_images_sorts_by_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_with_images(&temp_dir, &["c.png", "a.png", "b.png", "d.txt"], None)?;

        let images = select_images(&config)?;
        let expected: Vec<PathBuf> = ["a.png", "b.png", "c.png"]
            .iter()
            .map(|name| config.input_dir.join(name))
            .collect();
        assert_eq!(images, expected);
        Ok(())
    }

    #[test]
    fn test_select_images_applies_limit() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut config = config_with_images(&temp_dir, &["c.png", "a.png", "b.png"], Some(2))?;

        assert_eq!(
            select_images(&config)?,
            vec![config.input_dir.join("a.png"), config.input_dir.join("b.png")]
        );

        config.limit = Some(10);
        assert_eq!(select_images(&config)?.len(), 3);

        config.limit = Some(0);
        assert!(select_images(&config)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_image_rejects_grayscale() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("gray.png");
        GrayImage::new(8, 8).save(&path)?;

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, InferError::NotRgb { channels: 1, .. }));
        Ok(())
    }

    #[test]
    fn test_load_image_drops_alpha() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("rgba.png");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 4])).save(&path)?;

        let image = load_image(&path)?;
        assert_eq!(image.get_pixel(0, 0), &Rgb([1, 2, 3]));
        Ok(())
    }
}
