use crate::admission::Decision;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// One structured record per admitted or rejected request.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub client: String,
    pub decision: Decision,
    pub count_in_window: u32,
    pub ban_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    // opaque request context supplied by the HTTP layer
    pub context: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to serialize telemetry event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write telemetry event: {0}")]
    Io(#[from] io::Error),
}

/// Sink the controller hands every event to. Failures here are logged
/// and dropped by the controller; they never touch the decision path.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes one JSON object per line, either to stdout or appended to a
/// log file.
pub struct JsonLineSink {
    out: Mutex<Output>,
}

enum Output {
    Stdout,
    File(File),
}

impl JsonLineSink {
    pub fn stdout() -> Self {
        Self {
            out: Mutex::new(Output::Stdout),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: Mutex::new(Output::File(file)),
        })
    }
}

impl TelemetrySink for JsonLineSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let line = serde_json::to_string(event)?;
        let mut out = self
            .out
            .lock()
            .map_err(|e| TelemetryError::Io(io::Error::other(e.to_string())))?;
        match &mut *out {
            Output::Stdout => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                writeln!(handle, "{}", line)?;
            }
            Output::File(file) => writeln!(file, "{}", line)?,
        }
        Ok(())
    }
}
