use std::path::PathBuf;
use thiserror::Error;

/// Boxed error source carried by the context-wrapping variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the inference tool.
///
/// The first group of variants are the argument-validation failures that abort
/// a run before the model is loaded. The rest wrap errors from the filesystem,
/// the image codecs and ONNX Runtime with the operation that was in progress.
#[derive(Error, Debug)]
pub enum InferError {
    #[error("Directory {path:?} does not exist")]
    MissingDirectory { path: PathBuf },

    #[error("File {path:?} does not exist")]
    MissingFile { path: PathBuf },

    #[error("Directory {path:?} does not contain files with extension `{extension}`")]
    EmptyDirectory { path: PathBuf, extension: String },

    #[error("Image {path:?} is not RGB ({channels} channel(s)), please use RGB images")]
    NotRgb { path: PathBuf, channels: u8 },

    #[error("Class id {id} is out of range for {count} classes")]
    InvalidClassId { id: usize, count: usize },

    #[error("Detection sequences differ in length: {rois} boxes, {masks} masks, {class_ids} class ids, {scores} scores")]
    DetectionShape {
        rois: usize,
        masks: usize,
        class_ids: usize,
        scores: usize,
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, InferError>;

impl InferError {
    /// Wraps an error whose type cannot be boxed directly, keeping only its message.
    ///
    /// Session builder errors carry the builder itself, which is neither `Send`
    /// nor `Sync`.
    pub fn model(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Model {
            operation: operation.into(),
            source: Box::new(std::io::Error::other(err.to_string())),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should construct
/// `InferError::FileSystem` directly instead.
impl From<std::io::Error> for InferError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for InferError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for InferError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors only come out of tensor handling around the session, so they
/// are reported as model errors.
impl From<ndarray::ShapeError> for InferError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_path() {
        let err = InferError::EmptyDirectory {
            path: PathBuf::from("/data/in"),
            extension: ".png".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("/data/in"));
        assert!(message.contains(".png"));
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: InferError = io.into();
        assert!(matches!(err, InferError::FileSystem { .. }));
        assert_eq!(err.source().map(|s| s.to_string()), Some("gone".to_string()));
    }
}
