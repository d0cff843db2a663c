//! Descriptor extraction capability: image in, zero-or-one face descriptor out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns a decoded image into a face descriptor.
///
/// `Ok(None)` means no face was found, which is an expected outcome and not
/// an error. Every descriptor produced by one implementation has the same
/// length, so descriptors from a single extractor are always comparable.
pub trait DescriptorExtractor: Send {
    fn extract(&mut self, image: &DynamicImage) -> Result<Option<Embedding>, ExtractError>;
}

/// Decode raw image bytes (format sniffed from content).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
    Ok(image::load_from_memory(bytes)?)
}

/// SCRFD detection followed by ArcFace embedding of the most confident face.
pub struct FaceExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceExtractor {
    /// Load both ONNX models from `model_dir`. Fails if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl DescriptorExtractor for FaceExtractor {
    fn extract(&mut self, image: &DynamicImage) -> Result<Option<Embedding>, ExtractError> {
        let rgb = image.to_rgb8();
        let faces = self.detector.detect(&rgb)?;

        let Some(face) = faces.first() else {
            return Ok(None);
        };
        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "extract: best face selected"
        );

        Ok(Some(self.recognizer.extract(&rgb, face)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_decode_png() {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(7, 3, Rgb([1, 2, 3]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let image = decode_image(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (7, 3));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
    }

    #[test]
    fn test_load_missing_models() {
        let err = FaceExtractor::load(Path::new("/nonexistent/facematch-models"))
            .err()
            .expect("missing models must fail");
        assert!(matches!(err, ExtractError::Detector(DetectorError::ModelNotFound(_))));
    }
}
