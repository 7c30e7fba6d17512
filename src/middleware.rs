use crate::admission::Decision;
use crate::identity::ClientCandidates;
use crate::metrics::{
    ADMITTED_TOTAL, REJECTED_BANNED_TOTAL, REJECTED_RATE_LIMITED_TOTAL, REQUEST_LATENCY,
    REQUEST_TOTAL,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

// Admission guard in front of every application route. Maps REJECT_* to
// a 429 with a JSON error body; admitted requests carry their outcome in
// the request extensions for downstream handlers.
pub async fn admission_guard(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();
    let start = Instant::now();

    let direct_addr = addr.to_string();
    let candidates = ClientCandidates {
        real_ip: header_str(&req, "x-real-ip"),
        forwarded_for: header_str(&req, "x-forwarded-for"),
        direct_addr: &direct_addr,
    };

    // opaque request context, carried into telemetry untouched
    let context = serde_json::json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "user_agent": req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok()),
    });

    let outcome = match state.admission.check(&candidates, Instant::now(), context) {
        Ok(outcome) => outcome,
        Err(err) => {
            // contract violation from the transport layer, should not happen
            log::error!("admission contract violation: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": err.to_string()})),
            )
                .into_response();
        }
    };

    match outcome.decision {
        Decision::Admit => {
            ADMITTED_TOTAL.inc();
            req.extensions_mut().insert(outcome);
            let response = next.run(req).await;
            REQUEST_LATENCY.observe(start.elapsed().as_secs_f64());
            response
        }
        decision => {
            match decision {
                Decision::RejectBanned => REJECTED_BANNED_TOTAL.inc(),
                _ => REJECTED_RATE_LIMITED_TOTAL.inc(),
            }
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({"error": decision.message()})),
            )
                .into_response()
        }
    }
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}
