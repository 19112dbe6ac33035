use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};

use crate::errors::{InferError, Result};
use crate::files::get_files_list;

/// Run Mask R-CNN inference on a set of images.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Path to folder with images to be used
    #[arg(long = "input_images")]
    pub input_dir: PathBuf,

    /// Path to folder where output images will be stored
    #[arg(long = "output_images")]
    pub output_dir: PathBuf,

    /// Format extension of input images
    #[arg(long = "image_format", default_value = ".png")]
    pub image_format: String,

    /// Path to the model weights (ONNX)
    #[arg(long, default_value = "../mask_rcnn_coco.onnx")]
    pub weights: PathBuf,

    /// GPU used by the CUDA and TensorRT execution providers
    #[arg(long = "device_id", default_value_t = 0)]
    pub device_id: i32,

    /// Detections below this score are discarded
    #[arg(long = "min_confidence", default_value_t = 0.7, value_parser = check_confidence)]
    pub min_confidence: f32,

    /// TrueType font used for captions; captions are skipped without one
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Stop after this many images
    #[arg(long)]
    pub limit: Option<usize>,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    /// Sanity checks on the arguments. Creates the output directory when missing.
    pub fn validate(&self) -> Result<()> {
        check_dir_exists(&self.input_dir)?;
        check_file_exists(&self.weights)?;
        look_for_empty_dir(&self.input_dir, &self.image_format)?;
        make_dir_if_not_exist(&self.output_dir)?;
        Ok(())
    }

    /// Model settings with the CLI overrides applied.
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            detection_min_confidence: self.min_confidence,
            ..InferenceConfig::default()
        }
    }
}

fn check_confidence(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{s} is not a number: {e}"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{value} is outside [0, 1]"));
    }
    Ok(value)
}

fn check_file_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        error!(
            "Given file {} does not exist. Please provide a valid argument.",
            path.display()
        );
        return Err(InferError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn check_dir_exists(path: &Path) -> Result<()> {
    if !path.is_dir() {
        error!(
            "Given directory {} does not exist. Please provide a valid argument.",
            path.display()
        );
        return Err(InferError::MissingDirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn look_for_empty_dir(path: &Path, extension: &str) -> Result<()> {
    if get_files_list(path, extension)?.is_empty() {
        error!(
            "Directory {} does not contain files with extension {}",
            path.display(),
            extension
        );
        return Err(InferError::EmptyDirectory {
            path: path.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    Ok(())
}

fn make_dir_if_not_exist(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path).map_err(|e| InferError::FileSystem {
            path: path.to_path_buf(),
            operation: "create output directory".to_string(),
            source: e,
        })?;
        info!(
            "Given directory {} does not exist and it has been created",
            path.display()
        );
    }
    Ok(())
}

/// Mask R-CNN settings for COCO inference, one image per run.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub num_classes: usize,
    pub images_per_batch: usize,
    /// Short side is scaled up or down to this size...
    pub image_min_dim: u32,
    /// ...unless the long side would then exceed this one.
    pub image_max_dim: u32,
    /// Padded input sides are multiples of this.
    pub size_divisibility: u32,
    /// BGR channel means subtracted from the input.
    pub pixel_mean: [f32; 3],
    pub detection_min_confidence: f32,
    pub detection_max_instances: usize,
    pub mask_threshold: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            num_classes: crate::classes::CLASS_NAMES.len(),
            images_per_batch: 1,
            image_min_dim: 800,
            image_max_dim: 1024,
            size_divisibility: 32,
            pixel_mean: [102.9801, 115.9465, 122.7717],
            detection_min_confidence: 0.7,
            detection_max_instances: 100,
            mask_threshold: 0.5,
        }
    }
}

impl InferenceConfig {
    /// Checks the settings the exported graph depends on.
    pub fn validate(&self) -> Result<()> {
        if self.images_per_batch != 1 {
            return Err(InferError::Validation {
                field: "images_per_batch".to_string(),
                reason: format!(
                    "is {}, the exported graph takes one image per run",
                    self.images_per_batch
                ),
            });
        }
        if self.size_divisibility == 0 {
            return Err(InferError::Validation {
                field: "size_divisibility".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Scale factor applied to an image of the given size before inference.
    pub fn resize_scale(&self, width: u32, height: u32) -> f32 {
        let short = width.min(height) as f32;
        let long = width.max(height) as f32;
        let scale = self.image_min_dim as f32 / short;
        if long * scale > self.image_max_dim as f32 {
            self.image_max_dim as f32 / long
        } else {
            scale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(temp_dir: &TempDir) -> Config {
        Config {
            input_dir: temp_dir.path().join("input"),
            output_dir: temp_dir.path().join("output"),
            image_format: ".png".to_string(),
            weights: temp_dir.path().join("mask_rcnn_coco.onnx"),
            device_id: 0,
            min_confidence: 0.7,
            font: None,
            limit: None,
        }
    }

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse_from([
            "maskrcnn-infer",
            "--input_images",
            "in",
            "--output_images",
            "out",
        ]);
        assert_eq!(config.input_dir, PathBuf::from("in"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.image_format, ".png");
        assert_eq!(config.weights, PathBuf::from("../mask_rcnn_coco.onnx"));
        assert_eq!(config.limit, None);
    }

    #[test]
    fn test_every_flag_has_help() {
        use clap::CommandFactory;

        let command = Config::command();
        for arg in command.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{} has no help", arg.get_id());
        }
    }

    #[test]
    fn test_confidence_out_of_range_is_rejected() {
        let result = Config::try_parse_from([
            "maskrcnn-infer",
            "--input_images",
            "in",
            "--output_images",
            "out",
            "--min_confidence",
            "1.5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_input_dir() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_for(&temp_dir);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, InferError::MissingDirectory { .. }));
        Ok(())
    }

    #[test]
    fn test_missing_weights() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_for(&temp_dir);
        fs::create_dir_all(&config.input_dir)?;
        fs::write(config.input_dir.join("a.png"), b"")?;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, InferError::MissingFile { .. }));
        assert!(!config.output_dir.exists());
        Ok(())
    }

    #[test]
    fn test_extension_mismatch_is_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_for(&temp_dir);
        fs::create_dir_all(&config.input_dir)?;
        fs::write(config.input_dir.join("a.jpg"), b"")?;
        fs::write(&config.weights, b"weights")?;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, InferError::EmptyDirectory { .. }));
        Ok(())
    }

    #[test]
    fn test_creates_output_dir() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_for(&temp_dir);
        fs::create_dir_all(&config.input_dir)?;
        fs::write(config.input_dir.join("a.png"), b"")?;
        fs::write(&config.weights, b"weights")?;

        assert!(!config.output_dir.exists());
        config.validate()?;
        assert!(config.output_dir.is_dir());
        Ok(())
    }

    #[test]
    fn test_inference_config_is_single_image() {
        assert!(InferenceConfig::default().validate().is_ok());

        let batched = InferenceConfig {
            images_per_batch: 2,
            ..InferenceConfig::default()
        };
        assert!(matches!(
            batched.validate(),
            Err(InferError::Validation { field, .. }) if field == "images_per_batch"
        ));

        let unpadded = InferenceConfig {
            size_divisibility: 0,
            ..InferenceConfig::default()
        };
        assert!(unpadded.validate().is_err());
    }

    #[test]
    fn test_resize_scale() {
        let config = InferenceConfig::default();
        assert_eq!(config.resize_scale(500, 400), 2.0);
        // 2000x1000 would need a 1600 long side; capped at 1024.
        assert_eq!(config.resize_scale(2000, 1000), 1024.0 / 2000.0);
    }
}
