use crate::{controller::ErrorKind, controller::Phase, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    phase: &'static str,
    error: Option<ErrorKind>,
    pending: bool,
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let snapshot = state.controller.snapshot();
    let error = match snapshot.phase {
        Phase::Error(kind) => Some(kind),
        _ => None,
    };

    Json(StatusResponse {
        status: snapshot.status.as_str(),
        phase: snapshot.phase.as_str(),
        error,
        pending: snapshot.status.is_pending(),
    })
}
