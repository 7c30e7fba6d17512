use clap::Parser;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "admission-gateway")]
#[command(about = "Rate-limiting admission gateway with automatic client bans")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Max requests allowed per client per second
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Requests within one second before a client gets banned
    #[arg(long, default_value_t = 50)]
    pub ban_threshold: u32,

    // Ban duration in seconds
    #[arg(long, default_value_t = 300)]
    pub ban_duration: u64,

    // Retention window for per-client bookkeeping, in seconds
    #[arg(long, default_value_t = 60)]
    pub cleanup_window: u64,

    // Append access log records to this file instead of stdout
    #[arg(long)]
    pub access_log: Option<String>,
}

/// Admission tuning, fixed at process start.
///
/// Split out from [`Args`] so the controller and its tests can be built
/// without going through clap.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Max requests per client inside the rate window before rejecting
    pub request_limit_per_second: u32,

    /// Pre-append count past which a rejected client is escalated to a ban
    pub ban_threshold_count: u32,

    /// How long a ban lasts
    pub ban_duration: Duration,

    /// Hard window the rate check counts against
    pub rate_window: Duration,

    /// Retention horizon for per-client bookkeeping
    pub cleanup_window: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            request_limit_per_second: 10,
            ban_threshold_count: 50,
            ban_duration: Duration::from_secs(300),
            rate_window: Duration::from_secs(1),
            cleanup_window: Duration::from_secs(60),
        }
    }
}

impl From<&Args> for AdmissionConfig {
    fn from(args: &Args) -> Self {
        Self {
            request_limit_per_second: args.rate_limit,
            ban_threshold_count: args.ban_threshold,
            ban_duration: Duration::from_secs(args.ban_duration),
            rate_window: Duration::from_secs(1),
            cleanup_window: Duration::from_secs(args.cleanup_window),
        }
    }
}
