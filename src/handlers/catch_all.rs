use crate::admission::AdmissionOutcome;
use axum::Extension;
use axum::response::IntoResponse;

// Guarded application surface: every admitted request, whatever its
// method or path, gets a confirmation line back. The admission guard has
// already recorded the telemetry event by the time this runs.
pub async fn catch_all_handler(Extension(outcome): Extension<AdmissionOutcome>) -> impl IntoResponse {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    format!("Request from {} logged at {}", outcome.client, now)
}
