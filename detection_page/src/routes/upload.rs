use crate::{
    controller::{UploadOutcome, UploadStart},
    image_loader::ImageLoader,
    page::render_page,
    server::SharedState,
};
use axum::{
    extract::{Multipart, State},
    response::Html,
};
use tracing::instrument;

/// Shows the submitted image right away and runs detection in the
/// background; the page picks up the boxes by polling `/status`.
#[instrument(skip_all)]
pub async fn upload_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Html<String> {
    state.metrics.record_request("/upload");

    let file = match ImageLoader::read_multipart(&mut multipart).await {
        Ok(None) => {
            tracing::debug!("Upload form submitted without a file");
            return Html(render_page(&state.controller.snapshot()));
        }
        Ok(Some(file)) => Ok(file),
        Err(e) => Err(e),
    };

    match state.controller.start_upload(file) {
        UploadStart::Detecting(pending) => {
            let state = state.clone();
            tokio::spawn(async move {
                let outcome = state.controller.finish_detection(pending).await;
                record_outcome(&state, &outcome);
            });
        }
        UploadStart::Finished(outcome) => record_outcome(&state, &outcome),
    }

    Html(render_page(&state.controller.snapshot()))
}

fn record_outcome(state: &SharedState, outcome: &UploadOutcome) {
    state.metrics.record_upload(outcome.as_str());
    match outcome {
        UploadOutcome::Rendered { elapsed, .. } | UploadOutcome::DetectionFailed { elapsed } => {
            state
                .metrics
                .record_detection_duration(elapsed.as_millis() as u64, outcome.as_str());
        }
        _ => {}
    }
}
