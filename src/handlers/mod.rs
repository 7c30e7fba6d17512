mod catch_all;
mod health;
mod metrics;

pub use catch_all::catch_all_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
