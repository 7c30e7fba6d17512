mod admission;
mod bans;
mod config;
mod error;
mod handlers;
mod identity;
mod metrics;
mod middleware;
mod state;
mod telemetry;
mod window;

use crate::admission::AdmissionController;
use crate::config::{AdmissionConfig, Args};
use crate::state::AppState;
use crate::telemetry::{JsonLineSink, TelemetrySink};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

// this is main async function with tokio
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // parse cli arguments
    let args = Args::parse();
    let config = AdmissionConfig::from(&args);

    // access records go to a file when configured, stdout otherwise
    let sink: Arc<dyn TelemetrySink> = match &args.access_log {
        Some(path) => match JsonLineSink::file(path) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                eprintln!("cannot open access log {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Arc::new(JsonLineSink::stdout()),
    };

    // creating shared state
    let state = Arc::new(AppState {
        admission: AdmissionController::new(config.clone(), sink),
    });

    // spawn the background sweeper - keeps memory bounded to active clients
    let sweep_state = state.clone();
    let sweep_every = config.cleanup_window;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            sweep_state.admission.sweep(Instant::now());
        }
    });

    // everything except health and metrics sits behind the admission guard
    let guarded = Router::new()
        .fallback(handlers::catch_all_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admission_guard,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(guarded)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    println!("Admission gateway running on http://localhost:{}", args.port);
    println!(
        "Rate limit: {} requests per second per client",
        args.rate_limit
    );
    println!(
        "Ban: {} seconds once a client exceeds {} requests inside one second",
        args.ban_duration, args.ban_threshold
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
