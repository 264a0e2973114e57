use crate::detection::{
    DetectOptions, DetectionError, DetectionResult, DetectorFactory, ObjectDetector,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;

pub struct MockDetector {
    results: Vec<DetectionResult>,
    fail: bool,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockDetector {
    pub fn returning(results: Vec<DetectionResult>) -> Self {
        Self {
            results,
            fail: false,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(vec![])
        }
    }

    /// Holds every `detect` call until the gate is notified.
    pub fn gated(results: Vec<DetectionResult>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::returning(results)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectDetector for MockDetector {
    async fn detect(
        &self,
        image_source: &str,
        _options: DetectOptions,
    ) -> Result<Vec<DetectionResult>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(image_source.starts_with("data:"));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(DetectionError::Detector("mock failure".to_string()));
        }
        Ok(self.results.clone())
    }
}

pub struct MockFactory {
    detector: Option<Arc<MockDetector>>,
    loads: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockFactory {
    pub fn new(detector: MockDetector) -> Self {
        Self::sharing(Arc::new(detector))
    }

    pub fn sharing(detector: Arc<MockDetector>) -> Self {
        Self {
            detector: Some(detector),
            loads: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Holds `load` until the gate is notified.
    pub fn gated(detector: MockDetector, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(detector)
        }
    }

    pub fn failing() -> Self {
        Self {
            detector: None,
            loads: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectorFactory for MockFactory {
    async fn load(&self, model: &str) -> Result<Arc<dyn ObjectDetector>, DetectionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.detector {
            Some(detector) => {
                let detector: Arc<dyn ObjectDetector> = detector.clone();
                Ok(detector)
            }
            None => Err(DetectionError::ModelUnavailable {
                model: model.to_string(),
                reason: "mock load failure".to_string(),
            }),
        }
    }
}

/// 1x1 transparent PNG.
pub const PNG_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];
