use crate::config::DetectorConfig;
use crate::detection::{
    DetectOptions, DetectionError, DetectionResult, DetectorFactory, ObjectDetector,
};
use crate::image_loader::decode_data_url;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::{io::Cursor, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::instrument;

/// Loads detectors served by a remote inference endpoint exposing
/// `GET|POST {endpoint}/models/{model}`.
pub struct HttpDetectorFactory {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    load_timeout: Duration,
}

impl HttpDetectorFactory {
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(config.get_request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            load_timeout: config.get_load_timeout(),
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.endpoint, model)
    }
}

#[async_trait]
impl DetectorFactory for HttpDetectorFactory {
    #[instrument(skip(self))]
    async fn load(&self, model: &str) -> Result<Arc<dyn ObjectDetector>, DetectionError> {
        let url = self.model_url(model);
        let request = authorize(self.client.get(&url), self.api_token.as_deref());

        let response = match timeout(self.load_timeout, request.send()).await {
            Ok(response) => response?,
            Err(_) => {
                tracing::error!("Timed out probing {}", url);
                return Err(DetectionError::ModelUnavailable {
                    model: model.to_string(),
                    reason: format!("no answer within {}ms", self.load_timeout.as_millis()),
                });
            }
        };

        if !response.status().is_success() {
            return Err(DetectionError::ModelUnavailable {
                model: model.to_string(),
                reason: format!("endpoint answered {}", response.status()),
            });
        }

        tracing::info!("Model {} available at {}", model, url);
        let detector: Arc<dyn ObjectDetector> = Arc::new(HttpObjectDetector {
            client: self.client.clone(),
            url,
            api_token: self.api_token.clone(),
        });
        Ok(detector)
    }
}

pub struct HttpObjectDetector {
    client: Client,
    url: String,
    api_token: Option<String>,
}

#[async_trait]
impl ObjectDetector for HttpObjectDetector {
    #[instrument(skip(self, image_source))]
    async fn detect(
        &self,
        image_source: &str,
        options: DetectOptions,
    ) -> Result<Vec<DetectionResult>, DetectionError> {
        let (_, image_data) = decode_data_url(image_source)
            .map_err(|e| DetectionError::InvalidImageSource(e.to_string()))?;

        let request = authorize(self.client.post(&self.url), self.api_token.as_deref())
            .body(image_data.clone());
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let detections: Vec<DetectionResult> = response.json().await?;
        tracing::debug!("Inference returned {} candidates", detections.len());

        let dimensions = if options.percentage {
            Some(image_dimensions(&image_data)?)
        } else {
            None
        };

        Ok(postprocess(detections, options, dimensions))
    }
}

fn authorize(request: RequestBuilder, api_token: Option<&str>) -> RequestBuilder {
    match api_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

fn image_dimensions(image_data: &[u8]) -> Result<(u32, u32), DetectionError> {
    let reader = image::ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Applies the score threshold and, given the image size, converts pixel
/// boxes to fractions.
fn postprocess(
    detections: Vec<DetectionResult>,
    options: DetectOptions,
    dimensions: Option<(u32, u32)>,
) -> Vec<DetectionResult> {
    detections
        .into_iter()
        .filter(|d| d.score.map_or(true, |score| score >= options.threshold))
        .map(|mut d| {
            if let Some((width, height)) = dimensions {
                let (width, height) = (f64::from(width.max(1)), f64::from(height.max(1)));
                d.bbox.xmin /= width;
                d.bbox.xmax /= width;
                d.bbox.ymin /= height;
                d.bbox.ymax /= height;
            }
            d
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{pipeline, BoundingBox, OBJECT_DETECTION_TASK};
    use crate::image_loader::{ImageLoader, UploadedFile};
    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image::RgbImage::new(width, height)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("encode png");
        buffer.into_inner()
    }

    fn detection(label: &str, score: f64, bbox: BoundingBox) -> DetectionResult {
        DetectionResult {
            label: label.to_string(),
            score: Some(score),
            bbox,
        }
    }

    fn detector_config(endpoint: String) -> DetectorConfig {
        DetectorConfig {
            task: OBJECT_DETECTION_TASK.to_string(),
            model: "facebook/detr-resnet-50".to_string(),
            endpoint,
            api_token: Some("secret".to_string()),
            threshold: 0.5,
            percentage: true,
            load_timeout_ms: 2_000,
            request_timeout_ms: 2_000,
        }
    }

    async fn infer(headers: HeaderMap, body: Bytes) -> Result<Json<Value>, StatusCode> {
        let authorized = headers
            .get("authorization")
            .is_some_and(|value| value == "Bearer secret");
        if !authorized || body.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!([
            {"score": 0.97, "label": "cat", "box": {"xmin": 20, "ymin": 10, "xmax": 100, "ymax": 60}},
            {"score": 0.12, "label": "remote", "box": {"xmin": 0, "ymin": 0, "xmax": 10, "ymax": 10}}
        ])))
    }

    async fn spawn_inference_service() -> String {
        let router = Router::new().route(
            "/models/{*model}",
            get(|| async { Json(json!({"loaded": true})) }).post(infer),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{}", addr)
    }

    #[test]
    fn test_postprocess_filters_and_scales() {
        let detections = vec![
            detection("cat", 0.9, BoundingBox::new(20.0, 10.0, 100.0, 60.0)),
            detection("dog", 0.3, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ];

        let results = postprocess(detections, DetectOptions::default(), Some((200, 100)));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "cat");
        assert_eq!(results[0].bbox, BoundingBox::new(0.1, 0.1, 0.5, 0.6));
    }

    #[test]
    fn test_postprocess_keeps_pixels_without_dimensions() {
        let detections = vec![detection("cat", 0.5, BoundingBox::new(20.0, 10.0, 100.0, 60.0))];

        let results = postprocess(detections.clone(), DetectOptions::default(), None);
        assert_eq!(results, detections);
    }

    #[test]
    fn test_image_dimensions() -> Result<(), DetectionError> {
        assert_eq!(image_dimensions(&png(200, 100))?, (200, 100));
        Ok(())
    }

    #[tokio::test]
    async fn test_detects_through_remote_endpoint() -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = spawn_inference_service().await;
        let config = detector_config(endpoint);
        let factory = HttpDetectorFactory::new(&config)?;

        let detector = pipeline(&factory, &config.task, &config.model).await?;
        let file = UploadedFile::new("cat.png", None, Bytes::from(png(200, 100)));
        let data_url = ImageLoader::to_data_url(&file)?;
        let results = detector.detect(&data_url, config.detect_options()).await?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "cat");
        assert_eq!(results[0].bbox, BoundingBox::new(0.1, 0.1, 0.5, 0.6));
        Ok(())
    }

    #[tokio::test]
    async fn test_service_error_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = spawn_inference_service().await;
        let mut config = detector_config(endpoint);
        config.api_token = None;
        let factory = HttpDetectorFactory::new(&config)?;

        let detector = factory.load(&config.model).await?;
        let result = detector
            .detect("data:image/png;base64,AAAA", config.detect_options())
            .await;

        assert!(matches!(result, Err(DetectionError::Service { status: 401, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_load() -> Result<(), DetectionError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        drop(listener);

        let factory = HttpDetectorFactory::new(&detector_config(endpoint))?;
        assert!(factory.load("facebook/detr-resnet-50").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_image_source_is_rejected() -> Result<(), DetectionError> {
        let detector = HttpObjectDetector {
            client: Client::new(),
            url: "http://127.0.0.1:9/models/none".to_string(),
            api_token: None,
        };

        let result = detector
            .detect("https://example.com/cat.png", DetectOptions::default())
            .await;
        assert!(matches!(result, Err(DetectionError::InvalidImageSource(_))));
        Ok(())
    }
}
