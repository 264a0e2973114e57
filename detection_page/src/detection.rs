use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const OBJECT_DETECTION_TASK: &str = "object-detection";

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Unsupported task: {0}")]
    UnsupportedTask(String),
    #[error("Model {model} is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },
    #[error("Invalid image source: {0}")]
    InvalidImageSource(String),
    #[error("Inference request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Inference service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read image dimensions: {0}")]
    ImageDimensions(#[from] image::ImageError),
    #[error("Detector failed: {0}")]
    Detector(String),
}

/// Box corners. Fractions of the image size when detected with
/// `percentage: true`, pixels otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    fn is_finite(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
    }

    fn clamped(&self) -> Self {
        Self {
            xmin: self.xmin.clamp(0.0, 1.0),
            ymin: self.ymin.clamp(0.0, 1.0),
            xmax: self.xmax.clamp(0.0, 1.0),
            ymax: self.ymax.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl DetectionResult {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            score: None,
            bbox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub threshold: f64,
    pub percentage: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            percentage: true,
        }
    }
}

/// A loaded object detection model.
///
/// `image_source` is a data URL. With `options.percentage` set, every
/// returned box must be expressed in fractions of the image size.
#[async_trait]
pub trait ObjectDetector: Send + Sync + 'static {
    async fn detect(
        &self,
        image_source: &str,
        options: DetectOptions,
    ) -> Result<Vec<DetectionResult>, DetectionError>;
}

/// Acquires a detector for a model identifier. Called once per session.
#[async_trait]
pub trait DetectorFactory: Send + Sync + 'static {
    async fn load(&self, model: &str) -> Result<Arc<dyn ObjectDetector>, DetectionError>;
}

/// Builds a detector for `task` backed by `model`.
pub async fn pipeline<F>(
    factory: &F,
    task: &str,
    model: &str,
) -> Result<Arc<dyn ObjectDetector>, DetectionError>
where
    F: DetectorFactory + ?Sized,
{
    if task != OBJECT_DETECTION_TASK {
        return Err(DetectionError::UnsupportedTask(task.to_string()));
    }
    factory.load(model).await
}

/// Drops results with non-finite coordinates and clamps the rest into [0, 1].
/// Corner ordering is left as reported.
pub fn normalize_result(result: DetectionResult) -> Option<DetectionResult> {
    if !result.bbox.is_finite() {
        tracing::warn!(
            "Dropping detection `{}` with non-finite box {:?}",
            result.label,
            result.bbox
        );
        return None;
    }

    let clamped = result.bbox.clamped();
    if clamped != result.bbox {
        tracing::debug!(
            "Clamped box of `{}` from {:?} to {:?}",
            result.label,
            result.bbox,
            clamped
        );
    }

    Some(DetectionResult {
        bbox: clamped,
        ..result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDetector, MockFactory};

    #[tokio::test]
    async fn test_pipeline_rejects_unknown_task() {
        let factory = MockFactory::new(MockDetector::returning(vec![]));
        let result = pipeline(&factory, "image-classification", "some/model").await;

        assert!(matches!(result, Err(DetectionError::UnsupportedTask(task)) if task == "image-classification"));
        assert_eq!(factory.loads(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_loads_object_detector() -> Result<(), Box<dyn std::error::Error>> {
        let cat = DetectionResult::new("cat", BoundingBox::new(0.1, 0.1, 0.5, 0.6));
        let factory = MockFactory::new(MockDetector::returning(vec![cat.clone()]));

        let detector = pipeline(&factory, OBJECT_DETECTION_TASK, "some/model").await?;
        let results = detector
            .detect("data:image/png;base64,AA==", DetectOptions::default())
            .await?;

        assert_eq!(factory.loads(), 1);
        assert_eq!(results, vec![cat]);
        Ok(())
    }

    #[test]
    fn test_detection_result_deserializes_box_field() -> Result<(), serde_json::Error> {
        let json = r#"{"score":0.98,"label":"dog","box":{"xmin":0.5,"ymin":0.2,"xmax":0.9,"ymax":0.8}}"#;
        let result: DetectionResult = serde_json::from_str(json)?;

        assert_eq!(result.label, "dog");
        assert_eq!(result.score, Some(0.98));
        assert_eq!(result.bbox, BoundingBox::new(0.5, 0.2, 0.9, 0.8));
        Ok(())
    }

    #[test]
    fn test_normalize_clamps_out_of_range_coordinates() {
        let result = DetectionResult::new("kite", BoundingBox::new(-0.2, 0.1, 1.3, 0.4));
        let normalized = normalize_result(result).expect("finite box is kept");

        assert_eq!(normalized.bbox, BoundingBox::new(0.0, 0.1, 1.0, 0.4));
    }

    #[test]
    fn test_normalize_drops_non_finite_boxes() {
        let result = DetectionResult::new("ghost", BoundingBox::new(f64::NAN, 0.1, 0.2, 0.3));
        assert!(normalize_result(result).is_none());
    }

    #[test]
    fn test_normalize_keeps_inverted_boxes() {
        let result = DetectionResult::new("bird", BoundingBox::new(0.8, 0.1, 0.2, 0.3));
        let normalized = normalize_result(result.clone()).expect("finite box is kept");

        assert_eq!(normalized, result);
    }
}
