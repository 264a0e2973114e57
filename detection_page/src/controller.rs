use crate::container::ImageContainer;
use crate::detection::{
    normalize_result, pipeline, DetectOptions, DetectionError, DetectorFactory, ObjectDetector,
};
use crate::image_loader::{ImageLoader, ImageLoaderError, UploadedFile};
use crate::renderer::Renderer;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Error loading model: {0}")]
    ModelLoad(#[source] DetectionError),
    #[error("Error handling file upload: {0}")]
    FileRead(#[source] ImageLoaderError),
    #[error("Error detecting: {0}")]
    Detection(#[source] DetectionError),
}

impl ControllerError {
    fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::ModelLoad(_) => ErrorKind::ModelLoad,
            ControllerError::FileRead(_) => ErrorKind::FileRead,
            ControllerError::Detection(_) => ErrorKind::Detection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelLoad,
    FileRead,
    Detection,
}

impl ErrorKind {
    fn status(&self) -> Status {
        match self {
            ErrorKind::ModelLoad => Status::ErrorLoadingModel,
            ErrorKind::FileRead => Status::ErrorHandlingFileUpload,
            ErrorKind::Detection => Status::ErrorDetecting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ModelLoading,
    Ready,
    ImageLoaded,
    Analyzing,
    Done,
    Error(ErrorKind),
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ModelLoading => "model_loading",
            Phase::Ready => "ready",
            Phase::ImageLoaded => "image_loaded",
            Phase::Analyzing => "analyzing",
            Phase::Done => "done",
            Phase::Error(_) => "error",
        }
    }
}

/// The single line of text shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Empty,
    LoadingModel,
    Ready,
    Analyzing,
    ErrorLoadingModel,
    ErrorHandlingFileUpload,
    ErrorDetecting,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Empty => "",
            Status::LoadingModel => "Loading model...",
            Status::Ready => "Ready",
            Status::Analyzing => "Analyzing...",
            Status::ErrorLoadingModel => "Error loading model",
            Status::ErrorHandlingFileUpload => "Error handling file upload",
            Status::ErrorDetecting => "Error detecting",
        }
    }

    /// Whether the status is expected to change without user action.
    pub fn is_pending(&self) -> bool {
        matches!(self, Status::LoadingModel | Status::Analyzing)
    }
}

enum ModelState {
    NotLoaded,
    Loading,
    Loaded(Arc<dyn ObjectDetector>),
    Failed,
}

struct AppState {
    phase: Phase,
    status: Status,
    container: ImageContainer,
    model: ModelState,
    latest_upload: u64,
}

impl AppState {
    fn fail(&mut self, error: &ControllerError) {
        tracing::error!("{}", error);
        let kind = error.kind();
        self.phase = Phase::Error(kind);
        self.status = kind.status();
    }
}

/// Copy of the UI state, taken under the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub status: Status,
    pub container: ImageContainer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Detection finished and `boxes` overlays were drawn.
    Rendered { boxes: usize, elapsed: Duration },
    /// The image is shown but no detector is available.
    DisplayedOnly,
    /// A newer upload superseded this one before it finished.
    Stale,
    ReadFailed,
    DetectionFailed { elapsed: Duration },
}

impl UploadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadOutcome::Rendered { .. } => "rendered",
            UploadOutcome::DisplayedOnly => "displayed_only",
            UploadOutcome::Stale => "stale",
            UploadOutcome::ReadFailed => "read_failed",
            UploadOutcome::DetectionFailed { .. } => "detection_failed",
        }
    }
}

/// A displayed image waiting for its detection results.
pub struct PendingDetection {
    upload_id: u64,
    detector: Arc<dyn ObjectDetector>,
    image_src: String,
}

pub enum UploadStart {
    Detecting(PendingDetection),
    Finished(UploadOutcome),
}

/// Drives model loading and the upload, detect, render cycle.
#[derive(Clone)]
pub struct UploadController {
    state: Arc<Mutex<AppState>>,
    options: DetectOptions,
}

impl UploadController {
    pub fn new(options: DetectOptions) -> Self {
        let state = AppState {
            phase: Phase::Idle,
            status: Status::Empty,
            container: ImageContainer::default(),
            model: ModelState::NotLoaded,
            latest_upload: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            options,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            phase: state.phase,
            status: state.status,
            container: state.container.clone(),
        }
    }

    /// Acquires the detector. Runs once; a failure disables detection for
    /// the rest of the session.
    #[instrument(skip(self, factory))]
    pub async fn load_model<F>(&self, factory: &F, task: &str, model: &str)
    where
        F: DetectorFactory + ?Sized,
    {
        {
            let mut state = self.state.lock();
            if !matches!(state.model, ModelState::NotLoaded) {
                tracing::warn!("Model load requested twice, ignoring");
                return;
            }
            state.model = ModelState::Loading;
            state.phase = Phase::ModelLoading;
            state.status = Status::LoadingModel;
        }

        let started = Instant::now();
        let result = pipeline(factory, task, model).await;

        let mut state = self.state.lock();
        match result {
            Ok(detector) => {
                tracing::info!(
                    "Model {} loaded in {}ms",
                    model,
                    started.elapsed().as_millis()
                );
                state.model = ModelState::Loaded(detector);
                state.phase = Phase::Ready;
                state.status = Status::Ready;
            }
            Err(e) => {
                state.model = ModelState::Failed;
                state.fail(&ControllerError::ModelLoad(e));
            }
        }
    }

    /// Runs one upload cycle: display the file, detect, draw one box per
    /// result.
    pub async fn handle_file_upload(
        &self,
        file: Result<UploadedFile, ImageLoaderError>,
    ) -> UploadOutcome {
        match self.start_upload(file) {
            UploadStart::Detecting(pending) => self.finish_detection(pending).await,
            UploadStart::Finished(outcome) => outcome,
        }
    }

    /// Displays the uploaded image and, when a detector is loaded, moves to
    /// Analyzing. A failed read leaves the displayed image and any
    /// detection still running for it untouched.
    #[instrument(skip_all)]
    pub fn start_upload(&self, file: Result<UploadedFile, ImageLoaderError>) -> UploadStart {
        let image_src = file.and_then(|file| {
            tracing::debug!(
                "Loading {} ({} bytes)",
                file.file_name,
                file.bytes.len()
            );
            ImageLoader::to_data_url(&file)
        });

        let mut state = self.state.lock();
        let image_src = match image_src {
            Ok(image_src) => image_src,
            Err(e) => {
                state.fail(&ControllerError::FileRead(e));
                return UploadStart::Finished(UploadOutcome::ReadFailed);
            }
        };

        state.latest_upload += 1;
        let upload_id = state.latest_upload;
        state.container.display_image(image_src.clone());
        state.phase = Phase::ImageLoaded;

        let detector = match &state.model {
            ModelState::Loaded(detector) => detector.clone(),
            _ => {
                tracing::warn!("No detector available, showing image without detection");
                return UploadStart::Finished(UploadOutcome::DisplayedOnly);
            }
        };

        state.phase = Phase::Analyzing;
        state.status = Status::Analyzing;
        UploadStart::Detecting(PendingDetection {
            upload_id,
            detector,
            image_src,
        })
    }

    /// Awaits the detector and draws the results, unless a newer upload
    /// replaced the image in the meantime.
    #[instrument(skip_all, fields(upload_id = pending.upload_id))]
    pub async fn finish_detection(&self, pending: PendingDetection) -> UploadOutcome {
        let started = Instant::now();
        let result = pending
            .detector
            .detect(&pending.image_src, self.options)
            .await;
        let elapsed = started.elapsed();

        let mut state = self.state.lock();
        if state.latest_upload != pending.upload_id {
            tracing::info!(
                "Discarding detection for upload {}, latest is {}",
                pending.upload_id,
                state.latest_upload
            );
            return UploadOutcome::Stale;
        }

        match result {
            Ok(results) => {
                state.status = Status::Empty;
                let mut boxes = 0;
                for result in results.into_iter().filter_map(normalize_result) {
                    Renderer::render_box(&mut state.container, &result);
                    boxes += 1;
                }
                state.phase = Phase::Done;
                tracing::info!("Rendered {} boxes in {}ms", boxes, elapsed.as_millis());
                UploadOutcome::Rendered { boxes, elapsed }
            }
            Err(e) => {
                state.fail(&ControllerError::Detection(e));
                UploadOutcome::DetectionFailed { elapsed }
            }
        }
    }
}
